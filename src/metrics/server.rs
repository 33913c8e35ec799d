//! Prometheus scrape endpoint
//!
//! Runs on its own port, separate from the file API, and serves `/metrics`
//! and `/health`.
//!
//! # Example
//!
//! ```no_run
//! use gcs_file_api::metrics::server::MetricsServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = MetricsServer::new("127.0.0.1:9090".parse()?);
//!     let addr = server.start().await?;
//!     println!("Metrics server listening on {}", addr);
//!     Ok(())
//! }
//! ```

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Metrics server error
#[derive(Debug, thiserror::Error)]
pub enum MetricsServerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Metrics server already started")]
    AlreadyStarted,
}

/// Prometheus metrics HTTP server
pub struct MetricsServer {
    address: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MetricsServer {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            shutdown_tx: None,
            server_handle: None,
        }
    }

    /// Start serving in the background.
    ///
    /// Returns the actual bound address (useful when using port 0)
    pub async fn start(&mut self) -> Result<SocketAddr, MetricsServerError> {
        if self.server_handle.is_some() {
            return Err(MetricsServerError::AlreadyStarted);
        }

        let listener = TcpListener::bind(self.address).await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);
        self.server_handle = Some(tokio::spawn(accept_loop(listener, shutdown_rx)));

        tracing::info!(%addr, "Metrics server listening");
        Ok(addr)
    }

    /// Stop accepting connections and wait for the accept loop to exit
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
    }
}

async fn accept_loop(listener: TcpListener, mut shutdown_rx: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            result = listener.accept() => {
                let (stream, _) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "Metrics server failed to accept connection");
                        continue;
                    }
                };
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(io, service_fn(handle_request))
                        .await
                    {
                        tracing::debug!(error = %e, "Metrics connection closed with error");
                    }
                });
            }
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (status, content_type, body) = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => render_metrics(),
        (&Method::GET, "/health") => (
            StatusCode::OK,
            "application/json".to_string(),
            Bytes::from_static(br#"{"status":"healthy"}"#),
        ),
        _ => (
            StatusCode::NOT_FOUND,
            "text/plain".to_string(),
            Bytes::from_static(b"Not Found"),
        ),
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    Ok(response)
}

fn render_metrics() -> (StatusCode, String, Bytes) {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            encoder.format_type().to_string(),
            Bytes::from(buffer),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain".to_string(),
            Bytes::from(format!("Failed to encode metrics: {}", e)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().await.unwrap();
        assert!(matches!(
            server.start().await,
            Err(MetricsServerError::AlreadyStarted)
        ));
        server.shutdown().await;
    }

    #[test]
    fn test_render_metrics() {
        crate::metrics::record_transfer("render_test", "success");
        let (status, content_type, body) = render_metrics();
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/plain"));
        assert!(String::from_utf8_lossy(&body).contains("gcs_file_api_transfers_total"));
    }
}
