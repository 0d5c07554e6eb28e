//! parleyd - presence and chat routing daemon.

use parleyd::config::{Config, StoreBackend, validate};
use parleyd::services::{LoggingProtocol, Services, StaticDirectory};
use parleyd::store::{ChatStore, MemoryStore, RedbStore};
use parleyd::{Switchboard, http, metrics};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "parleyd.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "{} configuration error(s) in {config_path}",
            errors.len()
        ));
    }

    info!(
        server = %config.server.name,
        domains = ?config.server.domains,
        "Starting parleyd"
    );

    // Metrics port 0 disables the HTTP endpoint.
    let metrics_port = config.server.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    let store: Arc<dyn ChatStore> = match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Redb => {
            info!(path = %config.store.path, "Opening redb store");
            Arc::new(RedbStore::new(&config.store.path)?)
        }
    };
    let directory = StaticDirectory::from_config(&config.directory)?;
    info!(aliases = directory.len(), "Directory loaded");

    let services = Services::new(Arc::new(LoggingProtocol), store, Arc::new(directory));
    let switchboard = Switchboard::new(&config, services);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    switchboard.shutdown().await;
    Ok(())
}
