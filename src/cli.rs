//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using
//! the `clap` crate. These arguments are parsed at startup and then merged
//! with the configuration from the `termwatch.toml` file and environment
//! variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// A certificate-transparency watchlist monitor.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the watchlist term file.
    #[arg(long, value_name = "FILE")]
    pub terms_file: Option<PathBuf>,

    /// Term reload interval in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub reload_interval: Option<u64>,

    /// Backup interval in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub backup_interval: Option<u64>,

    /// Path of the SQLite match database.
    #[arg(long, value_name = "FILE")]
    pub db_path: Option<PathBuf>,

    /// Directory for compressed store backups.
    #[arg(long, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Logging level (e.g. "info", "debug").
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(path) = &self.terms_file {
            dict.insert(
                "terms.file".into(),
                Value::from(path.display().to_string()),
            );
        }

        if let Some(seconds) = self.reload_interval {
            dict.insert("terms.reload_interval_seconds".into(), Value::from(seconds));
        }

        if let Some(seconds) = self.backup_interval {
            dict.insert("backup.interval_seconds".into(), Value::from(seconds));
        }

        if let Some(path) = &self.db_path {
            dict.insert(
                "storage.db_path".into(),
                Value::from(path.display().to_string()),
            );
        }

        if let Some(path) = &self.backup_dir {
            dict.insert("backup.dir".into(), Value::from(path.display().to_string()));
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
