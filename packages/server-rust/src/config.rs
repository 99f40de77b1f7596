//! Configuration for the bridge: credentials, audit database, pool, and job.
//!
//! A single [`BridgeConfig`] is built once at process start (see the `bridge`
//! binary) and handed to every component as `Arc<BridgeConfig>`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bridge_core::CredentialSet;

/// Default location of the service-account credentials file.
pub const DEFAULT_CREDENTIALS_PATH: &str = "/etc/bridge/credentials.json";

/// Default queue the dispatcher consumes from.
pub const DEFAULT_INBOUND_QUEUE: &str = "bridge.requests";

/// Errors detected while loading or validating configuration.
///
/// All of them are fatal at startup of the owning component.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("credentials file {} could not be read: {source}", .path.display())]
    CredentialsUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credentials file {} is malformed: {source}", .path.display())]
    CredentialsMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Path to the service-account JSON file.
    pub credentials_path: PathBuf,
    /// Audit database connection parameters.
    pub database: DatabaseConfig,
    /// Connection pool sizing.
    pub pool: PoolConfig,
    /// Scheduled maintenance job settings.
    pub job: JobConfig,
    /// Queue the dispatcher consumes inbound requests from.
    pub inbound_queue: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            database: DatabaseConfig::default(),
            pool: PoolConfig::default(),
            job: JobConfig::default(),
            inbound_queue: DEFAULT_INBOUND_QUEUE.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Checks values that would otherwise fail later and less clearly.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database url must not be empty".into()));
        }
        if self.pool.max_size == 0 {
            return Err(ConfigError::Invalid("pool max size must be at least 1".into()));
        }
        if self.pool.acquire_timeout.is_zero() {
            return Err(ConfigError::Invalid("pool acquire timeout must be non-zero".into()));
        }
        if self.job.interval.is_zero() {
            return Err(ConfigError::Invalid("job interval must be non-zero".into()));
        }
        if self.inbound_queue.trim().is_empty() {
            return Err(ConfigError::Invalid("inbound queue name must not be empty".into()));
        }
        Ok(())
    }

    /// Reads and parses the credentials file.
    ///
    /// # Errors
    ///
    /// Returns `CredentialsUnreadable` if the file cannot be read and
    /// `CredentialsMalformed` if it is not a credential document.
    pub fn load_credentials(&self) -> Result<CredentialSet, ConfigError> {
        load_credentials(&self.credentials_path)
    }
}

/// Reads and parses a credentials file at `path`.
///
/// # Errors
///
/// See [`BridgeConfig::load_credentials`].
pub fn load_credentials(path: &Path) -> Result<CredentialSet, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::CredentialsUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    CredentialSet::from_json(&bytes).map_err(|source| ConfigError::CredentialsMalformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Audit database connection parameters.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/bridge".to_string(),
            username: "bridge".to_string(),
            password: String::new(),
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection pool sizing and wait policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of physical connections, idle and checked out combined.
    pub max_size: usize,
    /// How long `acquire` waits for a free slot before failing with
    /// `PoolError::Exhausted`.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Scheduled maintenance job settings.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Time between ticks.
    pub interval: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
        }
    }
}
