//! Interception configuration: which upstream responses get replaced by mocks.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterceptConfig {
    /// When false, every response is passed through and the proxy is transparent
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub status_check: StatusCheckConfig,
    /// Paths eligible for mocking; empty means every path
    #[serde(default)]
    pub include: Vec<PatternConfig>,
    /// Paths never mocked; wins over `include`
    #[serde(default)]
    pub exclude: Vec<PatternConfig>,
}

fn default_enabled() -> bool {
    true
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            status_check: StatusCheckConfig::default(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusCheckConfig {
    #[serde(default = "default_codes")]
    pub codes: Vec<u16>,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
}

fn default_codes() -> Vec<u16> {
    vec![404]
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

impl Default for StatusCheckConfig {
    fn default() -> Self {
        Self {
            codes: default_codes(),
            methods: default_methods(),
        }
    }
}

/// A URL pattern as written in YAML: a bare string is an exact match,
/// `{ regex: "..." }` is a regular expression.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PatternConfig {
    Literal(String),
    Regex { regex: String },
}
