//! Mock cache configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Entry lifetime in milliseconds (0 = entries expire as soon as stored)
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Append the raw query string to the cache key
    #[serde(default = "default_include_query")]
    pub include_query: bool,
    /// Share one generator call between concurrent misses for the same key
    #[serde(default = "default_single_flight")]
    pub single_flight: bool,
    /// Background sweep of expired entries (0 = lazy eviction only)
    #[serde(default)]
    pub cleanup_interval_secs: u64,
}

fn default_ttl_ms() -> u64 {
    30 * 60 * 1000
}

fn default_include_query() -> bool {
    true
}

fn default_single_flight() -> bool {
    true
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            include_query: default_include_query(),
            single_flight: default_single_flight(),
            cleanup_interval_secs: 0,
        }
    }
}
