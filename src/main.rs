//! GCS File API - HTTP file transfer service for a single GCS bucket

use clap::{Parser, ValueEnum};
use gcs_file_api::metrics::server::MetricsServer;
use gcs_file_api::storage::gcs::GcsBackend;
use gcs_file_api::{config::Config, server::Server, StorageGateway, TransferHandler};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

/// GCS File API - upload, download and delete files in a GCS bucket
#[derive(Parser, Debug)]
#[command(name = "gcs-file-api")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an optional dotenv file
    #[arg(short, long, default_value = ".env")]
    env_file: PathBuf,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Variables already set in the environment win over the file
    let env_loaded = if args.env_file.exists() {
        Some(dotenvy::from_path(&args.env_file))
    } else {
        None
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    match args.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }

    info!("Starting GCS File API v{}", gcs_file_api::VERSION);
    match env_loaded {
        Some(Ok(())) => info!("Loaded environment from {:?}", args.env_file),
        Some(Err(e)) => warn!(error = %e, "Failed to load environment from {:?}", args.env_file),
        None => {}
    }

    // Load configuration
    let config = Config::from_env()?;
    info!(
        bucket = %config.bucket_name,
        max_file_size = config.max_file_size,
        allowed_file_types = ?config.allowed_file_types,
        endpoint = %config.storage.endpoint,
        "Loaded configuration"
    );

    let mut metrics_server = if config.metrics.enabled {
        let addr = SocketAddr::new(config.socket_addr()?.ip(), config.metrics.port);
        let mut server = MetricsServer::new(addr);
        server.start().await?;
        Some(server)
    } else {
        None
    };

    let backend = GcsBackend::from_config(&config)?;
    let gateway = StorageGateway::new(Arc::new(backend));
    let handler = TransferHandler::new(gateway, config.upload_policy());

    // Start server
    let server = Server::bind(config.socket_addr()?, handler).await?;
    let result = server.run().await;

    if let Some(metrics) = metrics_server.as_mut() {
        metrics.shutdown().await;
    }
    if let Err(e) = &result {
        warn!("Server exited with error: {}", e);
    }
    result?;

    info!("GCS File API stopped");
    Ok(())
}
