//! The main application logic, decoupled from the entry point.
//!
//! Three independent activities run here: the ingestion workers fed by the
//! CertStream client, the term registry's reload task, and the backup
//! scheduler. They share only the term snapshot and the store's atomic
//! operations; none blocks another.

use crate::{
    audit::AuditLog,
    backup::BackupScheduler,
    config::Config,
    core::{CertificateEvent, EnrichmentOutcome, EnrichmentProvider, RecordOutcome},
    enrichment::{NullEnrichmentProvider, RdapClient},
    matching,
    network::CertStreamClient,
    store::MatchStore,
    task_manager::TaskManager,
    terms::{TermRegistry, TermSet},
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// A handle to the running application, containing all its task handles.
pub struct App {
    task_manager: TaskManager,
    store: Arc<MatchStore>,
    registry: TermRegistry,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The durable match store. Exposed for inspection in tests.
    pub fn store(&self) -> Arc<MatchStore> {
        self.store.clone()
    }

    /// The live term registry.
    pub fn terms(&self) -> &TermRegistry {
        &self.registry
    }

    /// Waits for the shutdown signal and then gracefully shuts down all
    /// tasks. In-flight event processing completes before the store closes.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        shutdown_rx.changed().await.ok();
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// This pattern allows for a clean separation of concerns between
/// constructing the application's components and running the application.
/// It also provides a convenient way to override components for testing.
pub struct AppBuilder {
    config: Config,
    events_rx_for_test: Option<async_channel::Receiver<CertificateEvent>>,
    enrichment_provider_override: Option<Arc<dyn EnrichmentProvider>>,
    term_reload_notifier: Option<mpsc::Sender<()>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            events_rx_for_test: None,
            enrichment_provider_override: None,
            term_reload_notifier: None,
        }
    }

    /// Overrides the event receiver channel for testing, in place of a live
    /// CertStream connection.
    pub fn events_rx_for_test(mut self, rx: async_channel::Receiver<CertificateEvent>) -> Self {
        self.events_rx_for_test = Some(rx);
        self
    }

    /// Overrides the enrichment provider for testing.
    pub fn enrichment_provider_override(mut self, provider: Arc<dyn EnrichmentProvider>) -> Self {
        self.enrichment_provider_override = Some(provider);
        self
    }

    /// Registers a channel signalled after every term reload, for tests
    /// that need to observe freshness.
    pub fn term_reload_notifier(mut self, tx: mpsc::Sender<()>) -> Self {
        self.term_reload_notifier = Some(tx);
        self
    }

    /// Builds and initializes all application components, returning a
    /// runnable `App`. Startup failures here are fatal by design: the
    /// process must not run while silently monitoring nothing.
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx);

        // =====================================================================
        // 1. Durable state and audit logs (fatal if unavailable)
        // =====================================================================
        let store = Arc::new(MatchStore::open(&config.storage.db_path)?);
        let audit = Arc::new(AuditLog::new(&config.audit.log_dir)?);

        // =====================================================================
        // 2. Term registry with its background reload task
        // =====================================================================
        let registry = TermRegistry::with_notifier(
            config.terms.file.clone(),
            Duration::from_secs(config.terms.reload_interval_seconds),
            task_manager.get_shutdown_rx(),
            self.term_reload_notifier,
        )
        .await?;

        // =====================================================================
        // 3. Enrichment provider
        // =====================================================================
        let enrichment: Arc<dyn EnrichmentProvider> = match self.enrichment_provider_override {
            Some(provider) => provider,
            None if config.enrichment.enabled => Arc::new(RdapClient::new(
                config.enrichment.rdap_base_url.clone(),
                Duration::from_secs(config.enrichment.timeout_seconds),
            )),
            None => Arc::new(NullEnrichmentProvider),
        };

        // =====================================================================
        // 4. Event source: test override or live CertStream client
        // =====================================================================
        let events_rx = if let Some(rx) = self.events_rx_for_test {
            rx
        } else {
            let (events_tx, rx) = async_channel::bounded(1024);
            let client = CertStreamClient::new(
                config.network.certstream_url.clone(),
                events_tx,
                config.network.allow_invalid_certs,
            );
            let client_shutdown_rx = task_manager.get_shutdown_rx();
            task_manager.spawn("CertStreamClient", async move {
                if let Err(e) = client.run(client_shutdown_rx).await {
                    error!("CertStream client failed: {e:#}");
                }
            });
            rx
        };

        // =====================================================================
        // 5. Ingestion worker pool
        // =====================================================================
        let concurrency = config.concurrency.max(1);
        info!("Spawning {} ingestion workers...", concurrency);
        for i in 0..concurrency {
            let events_rx = events_rx.clone();
            let registry = registry.clone();
            let store = store.clone();
            let audit = audit.clone();
            let enrichment = enrichment.clone();
            let mut worker_shutdown_rx = task_manager.get_shutdown_rx();

            task_manager.spawn(format!("IngestWorker-{i}"), async move {
                debug!("Ingestion worker {} started", i);
                loop {
                    // Shutdown is only honored between events: an event that
                    // has begun processing runs to completion, so in-flight
                    // store writes are never torn.
                    let event = tokio::select! {
                        biased;
                        _ = worker_shutdown_rx.changed() => {
                            debug!("Ingestion worker {} received shutdown signal, exiting.", i);
                            break;
                        }
                        event = events_rx.recv() => match event {
                            Ok(event) => event,
                            Err(_) => {
                                info!("Event channel closed, worker {} shutting down.", i);
                                break;
                            }
                        }
                    };

                    let snapshot = registry.current();
                    process_event(&event, &snapshot, &store, &audit, enrichment.as_ref()).await;
                }
            });
        }

        // =====================================================================
        // 6. Backup scheduler on its own clock
        // =====================================================================
        let scheduler = BackupScheduler::new(
            store.path().to_path_buf(),
            config.backup.dir.clone(),
            Duration::from_secs(config.backup.interval_seconds),
        );
        let backup_shutdown_rx = task_manager.get_shutdown_rx();
        task_manager.spawn("BackupScheduler", scheduler.run(backup_shutdown_rx));

        info!("TermWatch initialized successfully. Monitoring for matches...");

        Ok(App {
            task_manager,
            store,
            registry,
        })
    }
}

/// Runs one event through match → record-if-absent → audit → enrich.
///
/// Collaborator failures are captured as data or log lines; this function
/// never unwinds the ingestion activity.
pub async fn process_event(
    event: &CertificateEvent,
    terms: &TermSet,
    store: &MatchStore,
    audit: &AuditLog,
    enrichment: &dyn EnrichmentProvider,
) {
    metrics::counter!("events_processed").increment(1);

    let Some(term_match) = matching::evaluate(event, terms) else {
        return;
    };
    let timestamp = event.timestamp();

    match store.record_if_absent(&term_match.domain, &term_match.matched_term, &timestamp) {
        Ok(RecordOutcome::Inserted(_)) => {
            info!(
                domain = %term_match.domain,
                term = %term_match.matched_term,
                "Recorded first-seen match"
            );
            if let Err(e) = audit.record_match(&timestamp, &term_match.domain, &term_match.matched_term)
            {
                warn!("Failed to append matched-terms audit line: {e}");
            }

            // The base record is already durable; enrichment can only add.
            let outcome = enrichment.enrich(&term_match.domain).await;
            if let EnrichmentOutcome::Failed { reason } = &outcome {
                debug!(domain = %term_match.domain, "Registrant lookup failed: {reason}");
            }
            if let Err(e) = store.set_enrichment(&term_match.domain, &outcome.to_payload()) {
                metrics::counter!("storage_errors").increment(1);
                warn!(domain = %term_match.domain, "Failed to persist enrichment outcome: {e}");
            }
        }
        Ok(RecordOutcome::AlreadyPresent) => {
            metrics::counter!("duplicate_matches").increment(1);
            debug!(domain = %term_match.domain, "Domain already recorded");
            if let Err(e) = audit.record_duplicate(&timestamp, &term_match.domain) {
                warn!("Failed to append duplicate-check audit line: {e}");
            }
        }
        Err(e) => {
            // Persistence trouble on one event never stops the stream.
            metrics::counter!("storage_errors").increment(1);
            error!(
                domain = %term_match.domain,
                "Storage error, dropping event: {e}"
            );
        }
    }
}
