// src/config.rs
use std::{env, path::PathBuf};

const DEFAULT_DB_PATH: &str = "bhavdata.sqlite";
const DEFAULT_LOG_DIR: &str = "logs";

/// Where the importer keeps its database and audit logs.
///
/// Resolved from `BHAV_DB_PATH` / `BHAV_LOG_DIR`, falling back to
/// `bhavdata.sqlite` and `logs/` in the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            db_path: non_empty("BHAV_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            log_dir: non_empty("BHAV_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
        }
    }

    /// Audit log for archives that were skipped.
    pub fn archive_log_path(&self) -> PathBuf {
        self.log_dir.join("archives.log")
    }

    /// Audit log for rows the store rejected.
    pub fn row_log_path(&self) -> PathBuf {
        self.log_dir.join("rows.log")
    }
}
