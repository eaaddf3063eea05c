//! Watchlist term registry with periodic reload
//!
//! Terms are published as an immutable snapshot behind an atomic swap, so
//! ingestion workers read without locking and an in-flight evaluation keeps
//! the snapshot it started with.

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// An immutable snapshot of the watchlist.
///
/// Terms are lowercased on load. Duplicate lines collapse to their first
/// occurrence, and file order is preserved, which keeps first-match-wins
/// attribution stable for a given snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TermSet {
    terms: Vec<String>,
}

impl TermSet {
    /// Builds a snapshot from raw term lines. Blank lines and `#` comments
    /// are skipped.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        for line in lines {
            let term = line.as_ref().trim().to_lowercase();
            if term.is_empty() || term.starts_with('#') {
                continue;
            }
            if seen.insert(term.clone()) {
                terms.push(term);
            }
        }
        Self { terms }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.iter().any(|t| t == term)
    }
}

/// Reads the term file wholesale into a snapshot.
pub async fn load_terms_from_file<P: AsRef<Path>>(path: P) -> Result<TermSet> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read term file {:?}", path))?;
    Ok(TermSet::from_lines(content.lines()))
}

/// Publishes the current term snapshot and reloads it on a fixed cadence.
#[derive(Clone)]
pub struct TermRegistry {
    current: Arc<ArcSwap<TermSet>>,
}

impl TermRegistry {
    /// Loads the initial snapshot (startup-fatal on failure) and starts the
    /// background reload task.
    pub async fn new(
        term_file: PathBuf,
        reload_interval: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        Self::with_notifier(term_file, reload_interval, shutdown_rx, None).await
    }

    /// Like [`TermRegistry::new`], but signals on the notifier channel after
    /// every completed reload. Used by tests to observe freshness.
    pub async fn with_notifier(
        term_file: PathBuf,
        reload_interval: Duration,
        shutdown_rx: watch::Receiver<bool>,
        reload_notifier: Option<mpsc::Sender<()>>,
    ) -> Result<Self> {
        let initial = load_terms_from_file(&term_file).await?;
        info!(
            terms = initial.len(),
            file = %term_file.display(),
            "Loaded initial watchlist"
        );
        metrics::gauge!("terms_loaded").set(initial.len() as f64);

        let current = Arc::new(ArcSwap::from_pointee(initial));

        let registry = Self {
            current: current.clone(),
        };
        tokio::spawn(Self::run_reload_loop(
            current,
            term_file,
            reload_interval,
            shutdown_rx,
            reload_notifier,
        ));

        Ok(registry)
    }

    /// Returns the current snapshot. Lock-free; the returned `Arc` stays
    /// valid even if a reload swaps in a newer set mid-evaluation.
    pub fn current(&self) -> Arc<TermSet> {
        self.current.load_full()
    }

    /// Re-reads the term file every tick and atomically swaps the snapshot.
    /// A failed read keeps the previous snapshot; reload is best-effort and
    /// must never stop ingestion.
    async fn run_reload_loop(
        current: Arc<ArcSwap<TermSet>>,
        term_file: PathBuf,
        reload_interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
        reload_notifier: Option<mpsc::Sender<()>>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Term reload task received shutdown signal.");
                    break;
                }
                _ = tokio::time::sleep(reload_interval) => {}
            }

            match load_terms_from_file(&term_file).await {
                Ok(new_terms) => {
                    let old_count = current.load().len();
                    let new_count = new_terms.len();
                    current.store(Arc::new(new_terms));
                    metrics::gauge!("terms_loaded").set(new_count as f64);
                    info!(
                        terms = new_count,
                        delta = new_count as isize - old_count as isize,
                        "Reloaded watchlist"
                    );
                    if let Some(ref notifier) = reload_notifier {
                        if notifier.send(()).await.is_err() {
                            warn!("Reload notifier channel closed");
                        }
                    }
                }
                Err(e) => {
                    metrics::counter!("term_reload_failures").increment(1);
                    error!("Failed to reload watchlist, keeping previous snapshot: {e:#}");
                }
            }
        }
    }
}
