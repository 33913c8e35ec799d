//! Shared test infrastructure
//!
//! Starts the API on an OS-assigned port and offers request helpers.

#![allow(dead_code)]

use gcs_file_api::server::Server;
use gcs_file_api::storage::memory::MemoryBackend;
use gcs_file_api::storage::{StorageBackend, StorageGateway};
use gcs_file_api::transfer::TransferHandler;
use gcs_file_api::validation::UploadPolicy;
use reqwest::multipart::{Form, Part};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_BUCKET: &str = "test-bucket";

/// Running API server
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    _server_handle: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Serve `backend` with `policy`
    pub async fn spawn(backend: Arc<dyn StorageBackend>, policy: UploadPolicy) -> Self {
        let handler = TransferHandler::new(StorageGateway::new(backend), policy);
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), handler)
            .await
            .expect("Server should bind");
        let addr = server.local_addr();

        let server_handle = tokio::spawn(async move {
            let _ = server.run_with_shutdown(std::future::pending()).await;
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();

        Self {
            addr,
            client,
            _server_handle: server_handle,
        }
    }

    /// Serve a fresh in-memory bucket, also returned for inspection
    pub async fn in_memory(policy: UploadPolicy) -> (Self, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new(TEST_BUCKET));
        let app = Self::spawn(backend.clone(), policy).await;
        (app, backend)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// POST a multipart upload with the file in the `file` field
    pub async fn upload(&self, filename: &str, content_type: &str, data: Vec<u8>) -> reqwest::Response {
        let part = Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .unwrap();
        self.upload_form(Form::new().percent_encode_noop().part("file", part))
            .await
    }

    pub async fn upload_form(&self, form: Form) -> reqwest::Response {
        self.client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await
            .expect("Upload request should complete")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET should complete")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("DELETE should complete")
    }
}

/// Random payload of `len` bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|_| rand::random::<u8>()).collect()
}
