//! Configuration management for the server.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use formsync_engine::{SyncConfig, DEFAULT_BATCH_PAUSE, DEFAULT_BATCH_SIZE, DEFAULT_LOG_RETENTION};

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Bearer token required on every API call, when set
    pub auth_secret: Option<String>,
    /// Base URL destination links are built from
    pub public_url: String,
    /// Site identity used in destination titles
    pub site_name: String,
    pub import_batch_size: usize,
    pub import_batch_pause: Duration,
    /// Activity log entries kept
    pub log_retention: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;

        let auth_secret = lookup("AUTH_SECRET").filter(|secret| !secret.is_empty());

        let public_url = lookup("PUBLIC_URL")
            .unwrap_or_else(|| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        let site_name = lookup("SITE_NAME").unwrap_or_else(|| "formsync".to_string());

        let import_batch_size = parse_or(&lookup, "IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        let pause_ms = parse_or(
            &lookup,
            "IMPORT_BATCH_PAUSE_MS",
            DEFAULT_BATCH_PAUSE.as_millis() as u64,
        )?;
        let log_retention = parse_or(&lookup, "LOG_RETENTION", DEFAULT_LOG_RETENTION)?;

        Ok(Self {
            host,
            port,
            database_url,
            auth_secret,
            public_url,
            site_name,
            import_batch_size,
            import_batch_pause: Duration::from_millis(pause_ms),
            log_retention: log_retention.max(1),
        })
    }

    /// Engine settings derived from this configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_site_name(self.site_name.clone())
            .with_batch_size(self.import_batch_size)
            .with_batch_pause(self.import_batch_pause)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(name)),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {0} value, expected a non-negative integer")]
    InvalidNumber(&'static str),
}
