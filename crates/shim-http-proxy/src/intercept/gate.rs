//! The decision gate: `intercept = enabled && need_mock && eligible`.

use super::matcher::UrlFilter;
use super::policy::StatusCheckPolicy;
use crate::config::{ConfigError, InterceptConfig};
use hyper::{Method, StatusCode};

/// Outcome of the gate for one upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Stream the real response back unchanged.
    Passthrough,
    /// Discard the real response and serve a mock payload.
    Intercept,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Passthrough => "passthrough",
            Decision::Intercept => "intercept",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionGate {
    enabled: bool,
    policy: StatusCheckPolicy,
    filter: UrlFilter,
}

impl DecisionGate {
    pub fn new(enabled: bool, policy: StatusCheckPolicy, filter: UrlFilter) -> Self {
        Self {
            enabled,
            policy,
            filter,
        }
    }

    pub fn from_config(config: &InterceptConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.enabled,
            StatusCheckPolicy::from_config(&config.status_check)?,
            UrlFilter::from_config(&config.include, &config.exclude)?,
        ))
    }

    /// Evaluate the gate. `effective_path` is the route prefix joined with the
    /// mount-relative path, i.e. the path the client asked for.
    pub fn decide(&self, method: &Method, status: StatusCode, effective_path: &str) -> Decision {
        if !self.enabled {
            return Decision::Passthrough;
        }

        let need_mock = self.policy.needs_mock(status, method);
        let eligible = self.filter.allows(effective_path);

        if need_mock && eligible {
            Decision::Intercept
        } else {
            Decision::Passthrough
        }
    }
}
