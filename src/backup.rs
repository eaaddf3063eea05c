//! Periodic compressed backups of the match store
//!
//! The scheduler runs on its own task and re-arms its timer only after the
//! current cycle finishes, so a slow cycle can never overlap the next one.
//! Each cycle copies the backing file to a timestamped staging path, gzips
//! it, and removes the staging copy. Failures are logged and the next cycle
//! is scheduled regardless.

use anyhow::{Context, Result};
use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Timestamp embedded in backup artifact names.
const ARTIFACT_STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Self-rescheduling backup task for the store's backing file.
pub struct BackupScheduler {
    source: PathBuf,
    backup_dir: PathBuf,
    interval: Duration,
}

impl BackupScheduler {
    pub fn new(source: PathBuf, backup_dir: PathBuf, interval: Duration) -> Self {
        Self {
            source,
            backup_dir,
            interval,
        }
    }

    /// Runs until shutdown. Each pass sleeps the full interval, runs one
    /// cycle to completion, and only then arms the next sleep.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            dir = %self.backup_dir.display(),
            interval_seconds = self.interval.as_secs(),
            "Backup scheduler started"
        );
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Backup scheduler received shutdown signal.");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            match self.run_once().await {
                Ok(artifact) => {
                    metrics::counter!("backups_completed").increment(1);
                    info!(artifact = %artifact.display(), "Backup cycle completed");
                }
                Err(e) => {
                    metrics::counter!("backup_failures").increment(1);
                    warn!("Backup cycle failed, next cycle still scheduled: {e:#}");
                }
            }
        }
    }

    /// Runs a single copy → compress → clean-up cycle off the async
    /// runtime, returning the path of the produced artifact.
    pub async fn run_once(&self) -> Result<PathBuf> {
        let source = self.source.clone();
        let backup_dir = self.backup_dir.clone();
        let stamp = Local::now().format(ARTIFACT_STAMP_FORMAT).to_string();

        tokio::task::spawn_blocking(move || backup_file(&source, &backup_dir, &stamp))
            .await
            .context("backup task panicked")?
    }
}

/// Copies `source` into `backup_dir` under a timestamped name, compresses
/// the copy with gzip, and removes the uncompressed staging file.
///
/// The artifact is a byte-for-byte gzip of the backing file as it existed
/// when the copy step ran.
pub fn backup_file(source: &Path, backup_dir: &Path, stamp: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(backup_dir)
        .with_context(|| format!("failed to create backup dir {:?}", backup_dir))?;

    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("backup");
    let staging = backup_dir.join(format!("{}-{}.sqlite", stem, stamp));
    let artifact = staging.with_extension("sqlite.gz");

    debug!(staging = %staging.display(), "Backup: copying store file");
    std::fs::copy(source, &staging)
        .with_context(|| format!("failed to copy {:?} to {:?}", source, staging))?;

    debug!(artifact = %artifact.display(), "Backup: compressing");
    let result = compress(&staging, &artifact);

    debug!("Backup: cleaning up staging copy");
    if let Err(e) = std::fs::remove_file(&staging) {
        warn!(staging = %staging.display(), "Failed to remove staging copy: {e}");
    }

    result?;
    Ok(artifact)
}

fn compress(input: &Path, output: &Path) -> Result<()> {
    let mut reader = File::open(input)?;
    let writer = File::create(output)?;
    let mut encoder = GzEncoder::new(writer, Compression::default());
    std::io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn backup_produces_gzip_of_source_and_removes_staging() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("store.sqlite");
        let payload = b"certificate match records".repeat(64);
        std::fs::write(&source, &payload).unwrap();

        let backup_dir = dir.path().join("backups");
        let artifact = backup_file(&source, &backup_dir, "20260102-100000").unwrap();

        assert_eq!(
            artifact.file_name().unwrap().to_str().unwrap(),
            "store-20260102-100000.sqlite.gz"
        );

        let mut decoder = GzDecoder::new(File::open(&artifact).unwrap());
        let mut restored = Vec::new();
        decoder.read_to_end(&mut restored).unwrap();
        assert_eq!(restored, payload);

        // Staging copy is gone; only the artifact remains.
        let entries: Vec<_> = std::fs::read_dir(&backup_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["store-20260102-100000.sqlite.gz"]);
    }

    #[test]
    fn backup_of_missing_source_fails_without_panicking() {
        let dir = tempdir().unwrap();
        let result = backup_file(
            &dir.path().join("missing.sqlite"),
            &dir.path().join("backups"),
            "20260102-100000",
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_once_names_artifacts_by_creation_time() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("store.sqlite");
        std::fs::write(&source, b"data").unwrap();

        let scheduler = BackupScheduler::new(
            source,
            dir.path().join("backups"),
            Duration::from_secs(3600),
        );
        let artifact = scheduler.run_once().await.unwrap();
        let name = artifact.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("store-"));
        assert!(name.ends_with(".sqlite.gz"));
    }
}
