//! Configuration management for TermWatch
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to load configuration from a `termwatch.toml` file and merge it
//! with environment variables and command-line arguments.

use crate::cli::Cli;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Number of concurrent ingestion workers.
    pub concurrency: usize,
    /// Configuration for the CertStream network client.
    pub network: NetworkConfig,
    /// Configuration for the watchlist term registry.
    pub terms: TermsConfig,
    /// Configuration for the durable match store.
    pub storage: StorageConfig,
    /// Configuration for store backups.
    pub backup: BackupConfig,
    /// Configuration for registrant enrichment.
    pub enrichment: EnrichmentConfig,
    /// Configuration for the audit logs.
    pub audit: AuditConfig,
}

/// Configuration for the CertStream network client.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    /// The URL of the CertStream WebSocket server.
    pub certstream_url: String,
    /// Whether to accept invalid TLS certificates (for testing).
    pub allow_invalid_certs: bool,
}

/// Configuration for the watchlist term registry.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TermsConfig {
    /// Path to the term file, one case-insensitive term per line.
    pub file: PathBuf,
    /// How often the term file is re-read.
    pub reload_interval_seconds: u64,
}

/// Configuration for the durable match store.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Path of the SQLite file holding recorded matches.
    pub db_path: PathBuf,
}

/// Configuration for store backups.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackupConfig {
    /// Directory receiving the compressed backup artifacts.
    pub dir: PathBuf,
    /// Interval between backup cycles.
    pub interval_seconds: u64,
}

/// Configuration for registrant enrichment.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EnrichmentConfig {
    /// Whether first-seen matches are enriched at all.
    pub enabled: bool,
    /// Base URL of the RDAP service.
    pub rdap_base_url: String,
    /// Hard timeout for a single lookup.
    pub timeout_seconds: u64,
}

/// Configuration for the audit logs.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuditConfig {
    /// Directory for matched-terms.log and db_checks.log.
    pub log_dir: PathBuf,
}

impl Config {
    /// Loads the application configuration by layering sources:
    /// defaults, TOML file, `TERMWATCH_*` environment variables, CLI args.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from("termwatch.toml"));

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // Allow overriding with environment variables, e.g. TERMWATCH_LOG_LEVEL=debug
            .merge(Env::prefixed("TERMWATCH_"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            concurrency: num_cpus::get(),
            network: NetworkConfig {
                certstream_url: "wss://certstream.calidog.io".to_string(),
                allow_invalid_certs: false,
            },
            terms: TermsConfig {
                file: PathBuf::from("terms.txt"),
                reload_interval_seconds: 60,
            },
            storage: StorageConfig {
                db_path: PathBuf::from("db/certstream_db.sqlite"),
            },
            backup: BackupConfig {
                dir: PathBuf::from("backups"),
                interval_seconds: 3600,
            },
            enrichment: EnrichmentConfig {
                enabled: true,
                rdap_base_url: "https://rdap.org".to_string(),
                timeout_seconds: 10,
            },
            audit: AuditConfig {
                log_dir: PathBuf::from("logs"),
            },
        }
    }
}
