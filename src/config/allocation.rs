//! Allocation service configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable selecting the backend (`in_memory` or `postgres`).
pub const ENV_BACKEND: &str = "SHIFT_SLOTS_BACKEND";
/// Environment variable holding the Postgres connection string.
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
/// Environment variable for the pool size.
pub const ENV_MAX_CONNECTIONS: &str = "SHIFT_SLOTS_MAX_CONNECTIONS";
/// Environment variable for the slot lock timeout in milliseconds.
pub const ENV_LOCK_TIMEOUT_MS: &str = "SHIFT_SLOTS_LOCK_TIMEOUT_MS";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-process store for development and tests.
    #[default]
    InMemory,
    /// PostgreSQL via sqlx.
    Postgres,
}

impl StoreBackendConfig {
    fn parse(input: &str) -> Result<Self, String> {
        match input.trim().to_ascii_lowercase().as_str() {
            "in_memory" | "memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unknown backend `{other}`")),
        }
    }
}

/// Root configuration for building an allocation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Store backend.
    #[serde(default)]
    pub backend: StoreBackendConfig,
    /// Connection string; required for the Postgres backend.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a request waits for a slot lock before reporting a conflict.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

const fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

const fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendConfig::InMemory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

impl AllocationConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than 0".into());
        }
        if self.lock_timeout_ms == 0 {
            return Err("lock_timeout_ms must be greater than 0".into());
        }
        if self.backend == StoreBackendConfig::Postgres
            && self.database_url.as_deref().is_none_or(|url| url.trim().is_empty())
        {
            return Err("database_url is required for the postgres backend".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read configuration from the process environment, loading a `.env`
    /// file first when one exists. Unset variables fall back to defaults.
    pub fn from_env() -> Result<Self, String> {
        if let Some(err) = dotenv_problem(dotenvy::dotenv()) {
            tracing::warn!(error = %err, "ignoring unreadable .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(backend) = lookup(ENV_BACKEND) {
            cfg.backend = StoreBackendConfig::parse(&backend)?;
        }
        cfg.database_url = lookup(ENV_DATABASE_URL).filter(|url| !url.trim().is_empty());
        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            cfg.max_connections = raw
                .trim()
                .parse()
                .map_err(|e| format!("{ENV_MAX_CONNECTIONS}: {e}"))?;
        }
        if let Some(raw) = lookup(ENV_LOCK_TIMEOUT_MS) {
            cfg.lock_timeout_ms = raw
                .trim()
                .parse()
                .map_err(|e| format!("{ENV_LOCK_TIMEOUT_MS}: {e}"))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Lock timeout as a [`Duration`].
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// A missing `.env` is normal; anything else is worth reporting.
fn dotenv_problem(result: dotenvy::Result<PathBuf>) -> Option<dotenvy::Error> {
    result.err().filter(|err| !err.not_found())
}
