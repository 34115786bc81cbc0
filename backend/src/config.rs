//! Worker configuration loaded via OrthoConfig.
//!
//! Values come from `SERIES_INGEST_*` environment variables, configuration
//! files, or command-line arguments, in the precedence OrthoConfig applies.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::domain::SeriesCommitConfig;

/// Configuration values for the ingestion worker.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "SERIES_INGEST")]
pub struct IngestSettings {
    /// PostgreSQL connection string for the series store.
    pub database_url: Option<String>,
    /// Base URL of the price service.
    pub price_source_url: Option<String>,
    /// Upstream request timeout in seconds.
    #[ortho_config(default = 30)]
    pub request_timeout_secs: u64,
    /// Jobs processed at once by one worker.
    #[ortho_config(default = 4)]
    pub max_concurrent_jobs: usize,
    /// Commit attempts before a job fails as store-unavailable.
    #[ortho_config(default = 5)]
    pub commit_max_attempts: u32,
    /// Backoff before the first commit retry, in milliseconds.
    #[ortho_config(default = 50)]
    pub commit_initial_backoff_ms: u64,
    /// Upper bound on commit retry backoff, in milliseconds.
    #[ortho_config(default = 2000)]
    pub commit_max_backoff_ms: u64,
    /// Apply pending migrations before consuming jobs.
    pub run_migrations: Option<bool>,
}

/// Errors raised when settings are present but unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// A required value was not supplied.
    #[error("missing required setting {name}")]
    Missing { name: &'static str },
    /// A value failed to parse.
    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

impl IngestSettings {
    /// Return the database URL.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Missing`] when no URL was configured.
    pub fn database_url(&self) -> Result<&str, SettingsError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(SettingsError::Missing {
                name: "database_url",
            })
    }

    /// Return the parsed price service base URL.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is missing or unparsable.
    pub fn price_source_url(&self) -> Result<Url, SettingsError> {
        let raw = self
            .price_source_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(SettingsError::Missing {
                name: "price_source_url",
            })?;
        Url::parse(raw).map_err(|error| SettingsError::Invalid {
            name: "price_source_url",
            message: error.to_string(),
        })
    }

    /// Whether pending migrations run at startup; off unless configured.
    pub fn run_migrations(&self) -> bool {
        self.run_migrations.unwrap_or(false)
    }

    /// Upstream request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Worker concurrency, never below one.
    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs.max(1)
    }

    /// Commit retry policy derived from the settings.
    pub fn commit_config(&self) -> SeriesCommitConfig {
        SeriesCommitConfig {
            max_attempts: self.commit_max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.commit_initial_backoff_ms),
            max_backoff: Duration::from_millis(
                self.commit_max_backoff_ms.max(self.commit_initial_backoff_ms),
            ),
        }
    }
}
