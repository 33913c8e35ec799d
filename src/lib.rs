//! GCS File API Library
//!
//! Upload, download and delete files in a single Google Cloud Storage bucket
//! over HTTP, with size and type checks applied before anything is stored.
//!
//! # Features
//!
//! - **Streaming**: uploads are spooled to disk, downloads are passed through
//! - **Upload Policy**: maximum size and optional extension allow-list
//! - **Stable Errors**: `{"detail": ...}` bodies with 400/404/500 by failure kind
//! - **Pluggable Storage**: GCS JSON API backend, in-memory backend for tests
//!
//! # Example
//!
//! ```no_run
//! use gcs_file_api::{config::Config, server::Server, storage::gcs::GcsBackend};
//! use gcs_file_api::{storage::StorageGateway, transfer::TransferHandler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let gateway = StorageGateway::new(Arc::new(GcsBackend::from_config(&config)?));
//!     let handler = TransferHandler::new(gateway, config.upload_policy());
//!     let server = Server::bind(config.socket_addr()?, handler).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod router;
pub mod server;
pub mod storage;
pub mod transfer;
pub mod upload;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;
pub use storage::StorageGateway;
pub use transfer::TransferHandler;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
