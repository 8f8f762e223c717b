//! Configuration management
//!
//! [`Settings`] is assembled once at startup (defaults, then `.env`, then
//! environment variables, then command-line overrides) and handed to the
//! pipeline by value. Nothing reads configuration from global state.

use crate::error::{EtlError, Result};
use crate::registry::SchemaRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default target store: a local SQLite file created on first use.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://customer_opinions.db?mode=rwc";

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default number of pooled connections. Filter, load and verify share one
/// connection and use it sequentially.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 1;

/// Default directory holding the source CSV files.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default number of rows per INSERT statement.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default retry ceiling. Configured and reported, not acted upon.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Target store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub connect_timeout_secs: u64,
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// URL with any password replaced, for logging
    pub fn redacted_url(&self) -> String {
        redact_password(&self.url)
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
        }
    }
}

/// Cleaning toggles applied by the transformer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningSettings {
    /// Drop exact duplicate rows and all-null rows
    pub remove_duplicates: bool,
    /// Trim and lower-case `Email` (needs `clean_text_fields`)
    pub validate_emails: bool,
    /// Enable text normalization at all
    pub clean_text_fields: bool,
}

impl CleaningSettings {
    pub fn normalize_emails(&self) -> bool {
        self.clean_text_fields && self.validate_emails
    }

    pub fn normalize_names(&self) -> bool {
        self.clean_text_fields
    }
}

impl Default for CleaningSettings {
    fn default() -> Self {
        Self {
            remove_duplicates: true,
            validate_emails: true,
            clean_text_fields: true,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub data_dir: PathBuf,
    pub cleaning: CleaningSettings,
    pub batch_size: usize,
    pub max_retry_attempts: u32,
    pub registry: SchemaRegistry,
}

impl Settings {
    /// Load configuration from `.env`, environment variables and defaults
    ///
    /// Environment variables:
    /// - `DATABASE_URL`, `DATABASE_CONNECT_TIMEOUT`, `DATABASE_MAX_CONNECTIONS`
    /// - `ETL_DATA_DIR`, `ETL_BATCH_SIZE`, `ETL_MAX_RETRY_ATTEMPTS`
    /// - `ETL_REMOVE_DUPLICATES`, `ETL_VALIDATE_EMAILS`, `ETL_CLEAN_TEXT_FIELDS`
    /// - `ETL_REGISTRY`: path to a YAML schema registry
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Settings::default();
        let registry = match std::env::var("ETL_REGISTRY") {
            Ok(path) => SchemaRegistry::load(path)?,
            Err(_) => defaults.registry,
        };

        let settings = Settings {
            database: DatabaseSettings {
                url: std::env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                connect_timeout_secs: env_parse("DATABASE_CONNECT_TIMEOUT")?
                    .unwrap_or(defaults.database.connect_timeout_secs),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS")?
                    .unwrap_or(defaults.database.max_connections),
            },
            data_dir: std::env::var("ETL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            cleaning: CleaningSettings {
                remove_duplicates: env_parse("ETL_REMOVE_DUPLICATES")?
                    .unwrap_or(defaults.cleaning.remove_duplicates),
                validate_emails: env_parse("ETL_VALIDATE_EMAILS")?
                    .unwrap_or(defaults.cleaning.validate_emails),
                clean_text_fields: env_parse("ETL_CLEAN_TEXT_FIELDS")?
                    .unwrap_or(defaults.cleaning.clean_text_fields),
            },
            batch_size: env_parse("ETL_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
            max_retry_attempts: env_parse("ETL_MAX_RETRY_ATTEMPTS")?
                .unwrap_or(defaults.max_retry_attempts),
            registry,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(EtlError::config("Database URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(EtlError::config(
                "Database max_connections must be greater than 0",
            ));
        }

        if self.database.connect_timeout_secs == 0 {
            return Err(EtlError::config(
                "Database connect timeout must be greater than 0",
            ));
        }

        if self.batch_size == 0 {
            return Err(EtlError::config("Batch size must be greater than 0"));
        }

        self.registry.validate()
    }

    /// Full path of a table's source file
    pub fn source_path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    /// Source files named by the registry that do not exist on disk
    pub fn missing_source_files(&self) -> Vec<String> {
        self.registry
            .tables()
            .iter()
            .filter(|t| !self.source_path(&t.file).exists())
            .map(|t| t.file.clone())
            .collect()
    }

    /// Create the data directory if it does not exist
    pub fn ensure_data_dir(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(&self.data_dir)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            cleaning: CleaningSettings::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            registry: SchemaRegistry::customer_opinions(),
        }
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| EtlError::config(format!("{} has invalid value '{}': {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

fn redact_password(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
        None => url.to_string(),
    }
}
