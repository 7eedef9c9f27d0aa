//! Configuration for the peerkeep controller process.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding [`PeerkeepConfig::store_dir`].
pub const ENV_STORE_DIR: &str = "PEERKEEP_STORE_DIR";
/// Environment variable overriding [`PeerkeepConfig::default_namespace`].
pub const ENV_NAMESPACE: &str = "PEERKEEP_NAMESPACE";
/// Environment variable overriding [`PeerkeepConfig::log_filter`].
pub const ENV_LOG: &str = "PEERKEEP_LOG";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerkeepConfig {
    /// Root directory of the on-disk object store.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Namespace used when a command does not name one.
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Largest replica count a single reconciliation may ask for.
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,

    /// Requeue policy for failed reconciliations.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Exponential backoff settings for requeued reconciliations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_use_jitter")]
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            use_jitter: default_use_jitter(),
        }
    }
}

impl Default for PeerkeepConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            default_namespace: default_namespace(),
            log_filter: default_log_filter(),
            max_replicas: default_max_replicas(),
            retry: RetryConfig::default(),
        }
    }
}

impl PeerkeepConfig {
    /// Load configuration from a file.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or fails
    /// [`validate`](Self::validate).
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;

        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content).map_err(|e| Error::json_parse_failed(e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| Error::toml_parse_failed(e.to_string()))?
        };

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply overrides from `PEERKEEP_*` environment variables.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(ENV_STORE_DIR) {
            self.store_dir = PathBuf::from(dir);
        }
        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            self.default_namespace = namespace;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }
        self
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] or [`Error::InvalidName`].
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::invalid_config("retry.max_attempts must be at least 1"));
        }
        if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
            return Err(Error::invalid_config(format!(
                "retry.base_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.base_backoff_ms, self.retry.max_backoff_ms
            )));
        }
        if self.max_replicas == 0 {
            return Err(Error::invalid_config("max_replicas must be at least 1"));
        }
        crate::meta::validate_name(&self.default_namespace)
    }

    /// Check a requested replica count against [`Self::max_replicas`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `replicas` exceeds the limit.
    pub fn check_replicas(&self, replicas: u32) -> Result<()> {
        if replicas > self.max_replicas {
            return Err(Error::invalid_config(format!(
                "{replicas} replicas requested, max_replicas is {}",
                self.max_replicas
            )));
        }
        Ok(())
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".peerkeep/store")
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

const fn default_max_replicas() -> u32 {
    1024
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_base_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    5000
}

const fn default_use_jitter() -> bool {
    true
}
