//! TermWatch - Certificate Transparency Watchlist Monitor
//!
//! Watches the certificate transparency stream for domains containing
//! watchlist terms, records each first-seen match, and keeps compressed
//! backups of the match database.

use anyhow::Result;
use clap::Parser;
use termwatch::{app::App, cli::Cli, config::Config};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment,
    // and CLI args. Exit if configuration fails, as it's a critical step.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        eprintln!("Failed to load configuration: {err}");
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("TermWatch starting up...");

    // Log the loaded configuration settings for visibility
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Concurrency: {}", config.concurrency);
    info!("CertStream URL: {}", config.network.certstream_url);
    info!("Term File: {}", config.terms.file.display());
    info!(
        "Term Reload Interval: {}s",
        config.terms.reload_interval_seconds
    );
    info!("Match Database: {}", config.storage.db_path.display());
    info!("Backup Directory: {}", config.backup.dir.display());
    info!("Backup Interval: {}s", config.backup.interval_seconds);
    info!(
        "Enrichment: {}",
        if config.enrichment.enabled {
            "Enabled"
        } else {
            "Disabled"
        }
    );
    info!("Audit Log Directory: {}", config.audit.log_dir.display());
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = App::builder(config).build(shutdown_rx).await?;

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        info!("Shutdown signal received. Shutting down gracefully...");
        let _ = shutdown_tx.send(true);
    });

    app.run().await
}
