//! Configuration for publisher-verifier.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level verifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Server publisher lookup configuration.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Prefix list download configuration.
    #[serde(default)]
    pub prefix_list: PrefixListConfig,

    /// Record store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Configuration for coordinated server publisher lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Base URL of the publisher service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Age after which a stored record must be refetched, in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Longest a pending fetch may wait before its waiters are failed, in seconds.
    #[serde(default = "default_max_pending_wait_secs")]
    pub max_pending_wait_secs: u64,

    /// How often abandoned fetches are purged, in seconds.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Timeout for a single network request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Prefix list download configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixListConfig {
    /// Download the list periodically.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Explicit download URL. Defaults to `{endpoint}/publishers/prefix-list`.
    #[serde(default)]
    pub url: Option<String>,

    /// Where the last good list is cached on disk.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Refresh interval in hours.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_hours: u64,

    /// Delay before retrying a failed download, in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

/// In-memory record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of publisher records kept.
    #[serde(default = "default_store_capacity")]
    pub capacity: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            prefix_list: PrefixListConfig::default(),
            store: StoreConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            ttl_secs: default_ttl_secs(),
            max_pending_wait_secs: default_max_pending_wait_secs(),
            purge_interval_secs: default_purge_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for PrefixListConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            cache_path: default_cache_path(),
            refresh_interval_hours: default_refresh_interval(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: default_store_capacity(),
        }
    }
}

impl FetchConfig {
    /// Record time-to-live.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Maximum wait for a pending fetch.
    #[must_use]
    pub fn max_pending_wait(&self) -> Duration {
        Duration::from_secs(self.max_pending_wait_secs)
    }

    /// Interval between purge sweeps. Never zero.
    #[must_use]
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }

    /// Per-request network timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl PrefixListConfig {
    /// Resolve the download URL against the publisher endpoint.
    #[must_use]
    pub fn resolved_url(&self, endpoint: &str) -> String {
        self.url.clone().unwrap_or_else(|| {
            format!("{}/publishers/prefix-list", endpoint.trim_end_matches('/'))
        })
    }

    /// Refresh interval.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_hours.max(1) * 3600)
    }

    /// Retry delay after a failed download.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn default_cache_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "publisher-verifier")
        .map(|dirs| dirs.cache_dir().join("prefix-list.bin"))
        .unwrap_or_else(|| PathBuf::from(".publisher-verifier/prefix-list.bin"))
}

fn default_endpoint() -> String {
    "https://publishers.example.com".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_ttl_secs() -> u64 {
    5 * 3600 // 5 hours
}

const fn default_max_pending_wait_secs() -> u64 {
    120
}

const fn default_purge_interval_secs() -> u64 {
    30
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_refresh_interval() -> u64 {
    3 // 3 hours
}

const fn default_retry_delay_secs() -> u64 {
    300
}

const fn default_store_capacity() -> usize {
    10_000
}

impl VerifierConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
