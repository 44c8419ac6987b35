//! Link configuration.
//!
//! A link is one named database connection. Its settings come either from
//! code ([`LinkConfig::new`]) or from the environment:
//!
//! | variable                                   | default |
//! |--------------------------------------------|---------|
//! | `SCHEMALINK_<NAME>_DSN`                    | required |
//! | `SCHEMALINK_<NAME>_MAX_CONNECTIONS`        | 5       |
//! | `SCHEMALINK_<NAME>_ACQUIRE_TIMEOUT_SECS`   | 30      |
//! | `SCHEMALINK_<NAME>_PHASE_CONCURRENCY`      | 4       |
//!
//! A `.env` file in the working directory is loaded first.

use std::str::FromStr;
use std::time::Duration;

use schemalink_sql::Dialect;

use crate::{Error, Result};

/// Tuning for a synchronization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Tables processed concurrently within one phase.
    pub phase_concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            phase_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Name of the database, used in events and entity keys.
    pub name: String,
    pub dsn: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub sync: SyncOptions,
}

impl LinkConfig {
    pub fn new(name: impl Into<String>, dsn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dsn: dsn.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            sync: SyncOptions::default(),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn phase_concurrency(mut self, concurrency: usize) -> Self {
        self.sync.phase_concurrency = concurrency;
        self
    }

    /// Dialect selected by the DSN scheme.
    pub fn dialect(&self) -> Result<Dialect> {
        Dialect::from_dsn(&self.dsn).ok_or_else(|| {
            let scheme = self.dsn.split_once("://").map_or("", |(s, _)| s);
            Error::Config(format!(
                "link [{}]: unsupported DSN scheme '{}'",
                self.name, scheme
            ))
        })
    }

    /// Read the link from `SCHEMALINK_<NAME>_*` variables.
    pub fn from_env(name: &str) -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_vars(name, |key| std::env::var(key).ok())
    }

    /// The system link, `SCHEMALINK_SYSTEM_*`.
    pub fn system() -> Result<Self> {
        Self::from_env("system")
    }

    fn from_vars(name: &str, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let prefix = format!("SCHEMALINK_{}", name.to_ascii_uppercase().replace('-', "_"));
        let key = |suffix: &str| format!("{}_{}", prefix, suffix);

        let dsn = var(&key("DSN"))
            .ok_or_else(|| Error::Config(format!("{} is not set", key("DSN"))))?;
        let mut config = Self::new(name, dsn);
        config.dialect()?;

        if let Some(max) = parse(&key("MAX_CONNECTIONS"), var(&key("MAX_CONNECTIONS")))? {
            config.max_connections = max;
        }
        if let Some(secs) = parse(&key("ACQUIRE_TIMEOUT_SECS"), var(&key("ACQUIRE_TIMEOUT_SECS")))? {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse(&key("PHASE_CONCURRENCY"), var(&key("PHASE_CONCURRENCY")))? {
            config.sync.phase_concurrency = n;
        }
        if config.sync.phase_concurrency == 0 {
            return Err(Error::Config(format!(
                "{} must be at least 1",
                key("PHASE_CONCURRENCY")
            )));
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} has an invalid value '{}'", key, v)))
        })
        .transpose()
}
