//! Store configuration via `canvass.toml`
//!
//! Every section and field is optional; anything missing falls back to its
//! default. On first start a commented default file can be written with
//! [`StoreConfig::write_default_if_missing`].

use crate::retry::RetryConfig;
use canvass_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "canvass.toml";

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// `[connection]`: reconnect backoff and per-call deadline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionSection {
    /// Connection attempts before giving up
    pub max_retries: usize,
    /// First backoff delay
    pub base_delay_ms: u64,
    /// Backoff cap
    pub max_delay_ms: u64,
    /// Deadline for a single store call
    pub op_timeout_ms: u64,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay_ms: 100,
            max_delay_ms: 3000,
            op_timeout_ms: 2000,
        }
    }
}

/// `[history]`: history list growth policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HistorySection {
    /// Newest entries kept per list; 0 keeps everything
    pub max_len: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self { max_len: 1000 }
    }
}

/// `[kpi]`: metric retention and range-query strategy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KpiSection {
    /// Days a metric record lives
    pub retention_days: u64,
    /// Maintain a time-sorted index next to the records
    pub use_time_index: bool,
}

impl Default for KpiSection {
    fn default() -> Self {
        Self {
            retention_days: 30,
            use_time_index: true,
        }
    }
}

/// `[session]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionSection {
    /// Days a refresh token lives
    pub refresh_token_ttl_days: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            refresh_token_ttl_days: 7,
        }
    }
}

/// `[pagination]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PaginationSection {
    /// Page size when the caller gives none
    pub default_limit: usize,
    /// Largest page size a caller may ask for
    pub max_limit: usize,
}

impl Default for PaginationSection {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
        }
    }
}

/// `[sweeper]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SweeperSection {
    /// Time between expiry sweeps of the in-memory store
    pub interval_ms: u64,
}

impl Default for SweeperSection {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

/// Configuration loaded from `canvass.toml`
///
/// ```toml
/// [connection]
/// max_retries = 10
/// op_timeout_ms = 2000
///
/// [kpi]
/// retention_days = 30
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection settings
    pub connection: ConnectionSection,
    /// History list settings
    pub history: HistorySection,
    /// KPI settings
    pub kpi: KpiSection,
    /// Session settings
    pub session: SessionSection,
    /// Pagination settings
    pub pagination: PaginationSection,
    /// Expiry sweeper settings
    pub sweeper: SweeperSection,
}

impl StoreConfig {
    /// Backoff policy for connection attempts
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.connection.max_retries,
            base_delay_ms: self.connection.base_delay_ms,
            max_delay_ms: self.connection.max_delay_ms,
        }
    }

    /// Per-call deadline
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.op_timeout_ms)
    }

    /// Lifetime of a KPI record
    pub fn kpi_retention(&self) -> Duration {
        DAY.saturating_mul(self.kpi.retention_days.min(u32::MAX as u64) as u32)
    }

    /// Lifetime of a refresh token
    pub fn refresh_token_ttl(&self) -> Duration {
        DAY.saturating_mul(self.session.refresh_token_ttl_days.min(u32::MAX as u64) as u32)
    }

    /// Expiry sweep interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweeper.interval_ms)
    }

    /// Reject settings the store cannot run with
    pub fn validate(&self) -> Result<()> {
        let c = &self.connection;
        if c.max_retries == 0 {
            return Err(Error::Config("connection.max_retries must be at least 1".into()));
        }
        if c.base_delay_ms > c.max_delay_ms {
            return Err(Error::Config(format!(
                "connection.base_delay_ms ({}) exceeds connection.max_delay_ms ({})",
                c.base_delay_ms, c.max_delay_ms
            )));
        }
        if c.op_timeout_ms == 0 {
            return Err(Error::Config("connection.op_timeout_ms must be at least 1".into()));
        }
        if self.kpi.retention_days == 0 {
            return Err(Error::Config("kpi.retention_days must be at least 1".into()));
        }
        if self.session.refresh_token_ttl_days == 0 {
            return Err(Error::Config(
                "session.refresh_token_ttl_days must be at least 1".into(),
            ));
        }
        let p = &self.pagination;
        if p.default_limit == 0 {
            return Err(Error::Config("pagination.default_limit must be at least 1".into()));
        }
        if p.default_limit > p.max_limit {
            return Err(Error::Config(format!(
                "pagination.default_limit ({}) exceeds pagination.max_limit ({})",
                p.default_limit, p.max_limit
            )));
        }
        if self.sweeper.interval_ms == 0 {
            return Err(Error::Config("sweeper.interval_ms must be at least 1".into()));
        }
        Ok(())
    }

    /// Default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# Canvass store configuration

[connection]
# Connection attempts before startup fails, and the reconnect budget after a drop
max_retries = 10
# Backoff: base_delay_ms * 2^attempt, capped at max_delay_ms
base_delay_ms = 100
max_delay_ms = 3000
# Deadline for a single store call; a late call reports a timeout
op_timeout_ms = 2000

[history]
# Newest entries kept per history list (0 = unbounded, logs capacity warnings)
max_len = 1000

[kpi]
# Days before a metric record expires
retention_days = 30
# Keep a time-sorted index so range queries avoid a full key scan
use_time_index = true

[session]
refresh_token_ttl_days = 7

[pagination]
default_limit = 50
max_limit = 500

[sweeper]
# How often the in-memory store evicts expired keys
interval_ms = 1000
"#
    }

    /// Read, parse and validate config from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if none exists yet
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML at `path`
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
