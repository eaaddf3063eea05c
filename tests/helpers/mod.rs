#![allow(dead_code)]
//! Shared helpers for integration tests.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use termwatch::config::Config;
use termwatch::core::{
    EnrichmentFailure, EnrichmentOutcome, EnrichmentProvider, RegistrantInfo,
};

/// An enrichment provider with a fixed outcome and a call counter.
pub struct FakeEnrichmentProvider {
    outcome: EnrichmentOutcome,
    calls: AtomicUsize,
}

impl FakeEnrichmentProvider {
    /// Always reports a registration with the given registrar name.
    pub fn registered(registrar: &str) -> Self {
        Self {
            outcome: EnrichmentOutcome::Registered {
                info: RegistrantInfo {
                    handle: Some("TEST-1".to_string()),
                    registrar: Some(registrar.to_string()),
                    created: Some("2026-01-01T00:00:00Z".to_string()),
                    expires: None,
                    statuses: vec![],
                },
            },
            calls: AtomicUsize::new(0),
        }
    }

    /// Always reports a lookup timeout.
    pub fn failing() -> Self {
        Self {
            outcome: EnrichmentOutcome::Failed {
                reason: EnrichmentFailure::Timeout,
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnrichmentProvider for FakeEnrichmentProvider {
    async fn enrich(&self, _domain: &str) -> EnrichmentOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Builds a config rooted in `dir` with a term file containing `terms`.
/// Enrichment is disabled; tests that need it install an override.
pub fn test_config(dir: &Path, terms: &[&str]) -> Config {
    let terms_path = dir.join("terms.txt");
    std::fs::write(&terms_path, terms.join("\n")).expect("failed to write term file");

    let mut config = Config::default();
    config.concurrency = 2;
    config.terms.file = terms_path;
    config.storage.db_path = dir.join("db").join("certstream_db.sqlite");
    config.backup.dir = dir.join("backups");
    config.enrichment.enabled = false;
    config.audit.log_dir = dir.join("logs");
    config
}

/// Polls until `predicate` returns true or the timeout elapses.
pub async fn wait_for<F: Fn() -> bool>(predicate: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}
