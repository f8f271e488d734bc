//! Route configuration: one entry per proxied path prefix.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path prefix this route owns, e.g. `/api`
    pub prefix: String,
    /// Upstream base URL, e.g. `http://localhost:3000`
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<RewriteConfig>,
    /// Send the target's authority as Host instead of the inbound one
    #[serde(default = "default_change_origin")]
    pub change_origin: bool,
    /// Skip TLS certificate verification (for self-signed certs in dev/test)
    #[serde(default)]
    pub tls_skip_verify: bool,
}

fn default_change_origin() -> bool {
    true
}

/// Path rewrite applied before the request reaches the upstream.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RewriteConfig {
    StripPrefix { strip_prefix: bool },
    ReplacePrefix { replace_prefix: String },
    Regex { pattern: String, replacement: String },
}
