//! Configuration types for the Shim proxy.
//!
//! Everything here is read once at startup and is immutable afterwards.
//! [`Config::validate`] compiles routes and URL patterns so that every
//! configuration error surfaces before the listening socket is opened.

mod cache;
mod generator;
mod intercept;
mod listen;
mod protocol;
mod routing;
mod upstream;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use cache::CacheConfig;
pub use generator::GeneratorConfig;
pub use intercept::{InterceptConfig, PatternConfig, StatusCheckConfig};
pub use listen::{ListenConfig, MetricsConfig};
pub use protocol::Protocol;
pub use routing::{RewriteConfig, RouteConfig};
pub use upstream::UpstreamConfig;

use crate::intercept::{StatusCheckPolicy, UrlFilter};
use crate::routing::RouteTable;

/// Configuration errors. Always raised at construction time, never per request.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("At least one route must be configured")]
    NoRoutes,
    #[error("Invalid route prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },
    #[error("Route prefix '{0}' is configured more than once")]
    DuplicatePrefix(String),
    #[error("Invalid target '{target}' for route '{prefix}': {reason}")]
    InvalidTarget {
        prefix: String,
        target: String,
        reason: String,
    },
    #[error("Invalid rewrite for route '{prefix}': {reason}")]
    InvalidRewrite { prefix: String, reason: String },
    #[error("Invalid URL pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Invalid status code {0} in status_check.codes")]
    InvalidStatusCode(u16),
    #[error("Invalid HTTP method '{0}' in status_check.methods")]
    InvalidMethod(String),
    #[error("Metrics path '{0}' must start with '/' and must not fall under a route prefix")]
    InvalidMetricsPath(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub intercept: InterceptConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Verbose logging; never changes interception decisions
    #[serde(default)]
    pub debug: bool,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration by compiling everything the server will need.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let table = RouteTable::new(&self.routes)?;
        StatusCheckPolicy::from_config(&self.intercept.status_check)?;
        UrlFilter::from_config(&self.intercept.include, &self.intercept.exclude)?;

        if self.metrics.enabled {
            let path = &self.metrics.path;
            if !path.starts_with('/') || table.resolve(path).is_some() {
                return Err(ConfigError::InvalidMetricsPath(path.clone()));
            }
        }

        Ok(())
    }
}
