use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::fulladdress::RefreshScope;

/// Application-level constants
pub const APP_NAME: &str = "FIAS Import";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix of every destination table (`ADDROBJ` lands in `fias_addrobj`).
pub const TABLE_PREFIX: &str = "fias_";

/// Logical name of the address-object table inside the dump.
pub const ADDRESS_TABLE: &str = "ADDROBJ";

/// Rows fetched per iteration of the lexeme index builder.
pub const DEFAULT_BATCH_SIZE: u32 = 20;

pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_COMMIT_EVERY: u32 = 5_000;
pub const DEFAULT_PROGRESS_EVERY: u64 = 100_000;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    format!("fias_import_lib={level},fias_import={level}")
}

/// Destination table for a logical dump table.
pub fn destination_table(logical: &str) -> String {
    format!("{TABLE_PREFIX}{}", logical.to_lowercase())
}

pub fn is_address_table(logical: &str) -> bool {
    logical.eq_ignore_ascii_case(ADDRESS_TABLE)
}

/// Parse a comma-separated table allow-list. Spaces are ignored, names are
/// upper-cased and duplicates dropped.
pub fn parse_table_list(raw: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for name in raw.replace(' ', "").split(',') {
        if name.is_empty() {
            continue;
        }
        let name = name.to_uppercase();
        if !tables.contains(&name) {
            tables.push(name);
        }
    }
    tables
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("The list of tables to import is empty")]
    EmptyTableList,

    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("Commit interval must be greater than zero")]
    InvalidCommitInterval,

    #[error("Statement timeout must be greater than zero")]
    InvalidTimeout,

    #[error("Invalid database location: {0:?}")]
    InvalidDatabase(String),
}

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Import the archive, refresh full addresses, rebuild lexemes.
    Full,
    /// Recalculate full addresses only.
    #[value(alias = "addresses")]
    Address,
    /// Recalculate search lexemes only.
    #[value(alias = "lexemes")]
    Lexeme,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Address => "address",
            Self::Lexeme => "lexeme",
        }
    }

    pub fn ingests(&self) -> bool {
        matches!(self, Self::Full)
    }

    pub fn refreshes_addresses(&self) -> bool {
        matches!(self, Self::Full | Self::Address)
    }

    pub fn builds_lexemes(&self) -> bool {
        matches!(self, Self::Full | Self::Lexeme)
    }
}

/// Configuration for a single import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Archive (tar, tar.gz), directory or single XML file.
    pub archive_path: PathBuf,
    /// SQLite database path, `:memory:`, optionally prefixed with `sqlite://`.
    pub database: String,
    /// Upper-cased logical table names to import.
    pub tables: Vec<String>,
    pub mode: RunMode,
    /// Rows per lexeme batch.
    pub batch_size: u32,
    /// Upper bound for any single store statement.
    pub statement_timeout_secs: u64,
    /// Accepted records per ingestion transaction.
    pub commit_every: u32,
    /// Elements between ingestion progress log lines.
    pub progress_every: u64,
    pub refresh_scope: RefreshScope,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            archive_path: PathBuf::new(),
            database: "fias.db".to_string(),
            tables: vec![ADDRESS_TABLE.to_string()],
            mode: RunMode::Full,
            batch_size: DEFAULT_BATCH_SIZE,
            statement_timeout_secs: DEFAULT_STATEMENT_TIMEOUT_SECS,
            commit_every: DEFAULT_COMMIT_EVERY,
            progress_every: DEFAULT_PROGRESS_EVERY,
            refresh_scope: RefreshScope::ActiveOnly,
        }
    }
}

impl ImportConfig {
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }

    /// Database location with any `sqlite://` scheme removed.
    pub fn database_path(&self) -> &str {
        let trimmed = self.database.trim();
        trimmed.strip_prefix("sqlite://").unwrap_or(trimmed)
    }

    pub fn wants_table(&self, logical: &str) -> bool {
        self.tables.iter().any(|t| t.eq_ignore_ascii_case(logical))
    }

    /// Check everything that can be checked before touching the store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path().is_empty() {
            return Err(ConfigError::InvalidDatabase(self.database.clone()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.commit_every == 0 {
            return Err(ConfigError::InvalidCommitInterval);
        }
        if self.statement_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.mode.ingests() {
            if !self.archive_path.exists() {
                return Err(ConfigError::ArchiveNotFound(self.archive_path.clone()));
            }
            if self.tables.is_empty() {
                return Err(ConfigError::EmptyTableList);
            }
        }
        Ok(())
    }
}
