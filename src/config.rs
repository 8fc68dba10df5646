//! Scanner configuration
//!
//! Defaults follow the values the scanner has always used (pool of 1..5
//! connections, 1000 pages per task, 30 second bind budget). Every knob except
//! the page size can be overridden through `MYSQL_SCANNER_*` environment
//! variables when the extension is loaded.

use std::time::Duration;

use crate::error::{Error, Result};

/// DuckDB's `STANDARD_VECTOR_SIZE`; one page of MySQL rows fills one output chunk.
pub const STANDARD_VECTOR_SIZE: usize = 2048;

const ENV_MIN_POOL_SIZE: &str = "MYSQL_SCANNER_MIN_POOL_SIZE";
const ENV_MAX_POOL_SIZE: &str = "MYSQL_SCANNER_MAX_POOL_SIZE";
const ENV_CONNECT_RETRIES: &str = "MYSQL_SCANNER_CONNECT_RETRIES";
const ENV_ACQUIRE_TIMEOUT: &str = "MYSQL_SCANNER_ACQUIRE_TIMEOUT_SECS";
const ENV_PAGES_PER_TASK: &str = "MYSQL_SCANNER_PAGES_PER_TASK";
const ENV_BIND_TIMEOUT: &str = "MYSQL_SCANNER_BIND_TIMEOUT_SECS";

/// Scanner configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Connections opened eagerly when a pool is created
    pub min_pool_size: usize,
    /// Upper bound on live connections per endpoint
    pub max_pool_size: usize,
    /// Attempts to open a connection on demand before giving up
    pub connect_retries: usize,
    /// Maximum time to wait for a connection when the pool is at capacity
    pub acquire_timeout: Duration,
    /// Pages claimed by a task at a time
    pub pages_per_task: u64,
    /// Rows per page (LIMIT of each paginated query)
    pub page_size: usize,
    /// Budget for the bind-time metadata round trip
    pub bind_timeout: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 1,
            max_pool_size: 5,
            connect_retries: 3,
            acquire_timeout: Duration::from_secs(30),
            pages_per_task: 1000,
            page_size: STANDARD_VECTOR_SIZE,
            bind_timeout: Duration::from_secs(30),
        }
    }
}

impl ScannerConfig {
    /// Defaults overridden by any `MYSQL_SCANNER_*` variable that parses.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = parse_var::<usize>(&lookup, ENV_MIN_POOL_SIZE) {
            config.min_pool_size = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, ENV_MAX_POOL_SIZE) {
            config.max_pool_size = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, ENV_CONNECT_RETRIES) {
            config.connect_retries = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, ENV_ACQUIRE_TIMEOUT) {
            config.acquire_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, ENV_PAGES_PER_TASK) {
            config.pages_per_task = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, ENV_BIND_TIMEOUT) {
            config.bind_timeout = Duration::from_secs(v);
        }
        config
    }

    /// Set minimum pool size
    pub fn with_min_pool_size(mut self, size: usize) -> Self {
        self.min_pool_size = size;
        self
    }

    /// Set maximum pool size
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the number of connect attempts
    pub fn with_connect_retries(mut self, retries: usize) -> Self {
        self.connect_retries = retries;
        self
    }

    /// Set acquire timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set pages per task
    pub fn with_pages_per_task(mut self, pages: u64) -> Self {
        self.pages_per_task = pages;
        self
    }

    /// Set page size
    pub fn with_page_size(mut self, rows: usize) -> Self {
        self.page_size = rows;
        self
    }

    /// Set bind timeout
    pub fn with_bind_timeout(mut self, timeout: Duration) -> Self {
        self.bind_timeout = timeout;
        self
    }

    /// Reject settings the pool or the pager cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_pool_size == 0 {
            return Err(Error::config("max_pool_size must be at least 1"));
        }
        if self.min_pool_size > self.max_pool_size {
            return Err(Error::config(format!(
                "min_pool_size ({}) exceeds max_pool_size ({})",
                self.min_pool_size, self.max_pool_size
            )));
        }
        if self.pages_per_task == 0 {
            return Err(Error::config("pages_per_task must be at least 1"));
        }
        if self.page_size == 0 || self.page_size > STANDARD_VECTOR_SIZE {
            return Err(Error::config(format!(
                "page_size must be within 1..={}",
                STANDARD_VECTOR_SIZE
            )));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ScannerConfig::default();

        assert_eq!(config.min_pool_size, 1);
        assert_eq!(config.max_pool_size, 5);
        assert_eq!(config.connect_retries, 3);
        assert_eq!(config.pages_per_task, 1000);
        assert_eq!(config.page_size, 2048);
        assert_eq!(config.bind_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_MAX_POOL_SIZE, "8"),
            (ENV_PAGES_PER_TASK, " 10 "),
            (ENV_BIND_TIMEOUT, "5"),
            (ENV_MIN_POOL_SIZE, "many"),
        ]
        .into_iter()
        .collect();

        let config = ScannerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.max_pool_size, 8);
        assert_eq!(config.pages_per_task, 10);
        assert_eq!(config.bind_timeout, Duration::from_secs(5));
        // unparseable value keeps the default
        assert_eq!(config.min_pool_size, 1);
    }

    #[test]
    fn test_validate_rejects_inverted_pool_bounds() {
        let config = ScannerConfig::default()
            .with_min_pool_size(6)
            .with_max_pool_size(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_quota() {
        assert!(ScannerConfig::default().with_pages_per_task(0).validate().is_err());
        assert!(ScannerConfig::default().with_page_size(0).validate().is_err());
        assert!(ScannerConfig::default().with_max_pool_size(0).with_min_pool_size(0).validate().is_err());
    }
}
