//! HTTP server module
//!
//! Accepts connections with `hyper` on `tokio` and hands every request to a
//! [`TransferHandler`].
//!
//! # Example
//!
//! ```no_run
//! use gcs_file_api::server::Server;
//! use gcs_file_api::storage::{memory::MemoryBackend, StorageGateway};
//! use gcs_file_api::transfer::TransferHandler;
//! use gcs_file_api::validation::UploadPolicy;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = StorageGateway::new(Arc::new(MemoryBackend::new("local")));
//! let handler = TransferHandler::new(gateway, UploadPolicy::unrestricted(1024 * 1024));
//! let server = Server::bind("127.0.0.1:0".parse()?, handler).await?;
//! println!("Server bound to: {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use crate::transfer::{ResponseBody, TransferHandler};
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

/// Response header carrying the generated request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// HTTP Server
pub struct Server {
    handler: TransferHandler,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind to `addr`. Port 0 lets the OS pick a port, see [`Server::local_addr`].
    pub async fn bind(addr: SocketAddr, handler: TransferHandler) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            handler,
            listener,
            local_addr,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until SIGINT or SIGTERM
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `signal` completes.
    ///
    /// On shutdown the listener is closed first, then open connections finish
    /// their in-flight requests before this returns.
    pub async fn run_with_shutdown<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting server on {}", self.local_addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let mut connections = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => break,
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let handler = self.handler.clone();
                    let mut shutdown_rx = shutdown_rx.clone();

                    connections.spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let handler = handler.clone();
                            async move { Ok::<_, Infallible>(serve_request(&handler, req).await) }
                        });

                        let conn = http1::Builder::new().serve_connection(io, service);
                        tokio::pin!(conn);

                        let result = tokio::select! {
                            result = conn.as_mut() => result,
                            _ = shutdown_rx.changed() => {
                                conn.as_mut().graceful_shutdown();
                                conn.await
                            }
                        };
                        if let Err(e) = result {
                            debug!("Error serving connection from {}: {}", peer_addr, e);
                        }
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(self.listener);
        info!(
            open_connections = connections.len(),
            "Shutting down server"
        );

        // Ask every connection to finish its current request and close
        let _ = shutdown_tx.send(());
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!("Connection task failed: {}", e);
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Run one request inside an `http.request` span and tag the response with its id
async fn serve_request(handler: &TransferHandler, req: Request<Incoming>) -> Response<ResponseBody> {
    let request_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!(
        "http.request",
        http.method = %req.method(),
        http.target = %req.uri().path(),
        request_id = %request_id,
        http.status_code = tracing::field::Empty,
    );

    let start = Instant::now();
    let mut response = handler.handle(req).instrument(span.clone()).await;
    let status = response.status().as_u16();
    span.record("http.status_code", status);
    span.in_scope(|| {
        info!(
            status,
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        )
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
