//! Route table: maps inbound path prefixes to upstream targets.
//!
//! Built once at startup from [`RouteConfig`] entries. Matching is
//! first-match-wins in declaration order and respects path segment
//! boundaries, so `/api` owns `/api` and `/api/users` but not `/apix`.

use crate::config::{ConfigError, Protocol, RewriteConfig, RouteConfig};
use hyper::Uri;
use regex::Regex;
use std::collections::HashSet;

/// Route table matching inbound request paths to upstream targets.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

/// A route compiled from configuration. Immutable after startup.
#[derive(Debug)]
pub struct CompiledRoute {
    prefix: String,
    target: String,
    protocol: Protocol,
    rewrite: Option<PathRewrite>,
    change_origin: bool,
    tls_skip_verify: bool,
}

#[derive(Debug)]
enum PathRewrite {
    StripPrefix,
    ReplacePrefix(String),
    Regex { pattern: Regex, replacement: String },
}

impl RouteTable {
    /// Compile route configuration, failing on the first invalid entry.
    pub fn new(routes: &[RouteConfig]) -> Result<Self, ConfigError> {
        if routes.is_empty() {
            return Err(ConfigError::NoRoutes);
        }

        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(routes.len());

        for route in routes {
            let route = compile_route(route)?;
            if !seen.insert(route.prefix.clone()) {
                return Err(ConfigError::DuplicatePrefix(route.prefix));
            }
            compiled.push(route);
        }

        Ok(RouteTable { routes: compiled })
    }

    /// Find the route owning `path`, if any.
    pub fn resolve(&self, path: &str) -> Option<&CompiledRoute> {
        self.routes.iter().find(|route| route.owns(path))
    }

    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }
}

impl CompiledRoute {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn change_origin(&self) -> bool {
        self.change_origin
    }

    /// True for HTTPS targets whose certificates are not checked.
    pub fn skips_tls_verify(&self) -> bool {
        self.tls_skip_verify && self.protocol == Protocol::Https
    }

    fn owns(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Path as the upstream sees it, after the configured rewrite.
    pub fn upstream_path(&self, path: &str) -> String {
        let rest = || path.strip_prefix(self.prefix.as_str()).unwrap_or(path);

        let rewritten = match &self.rewrite {
            None => path.to_string(),
            Some(PathRewrite::StripPrefix) => rest().to_string(),
            Some(PathRewrite::ReplacePrefix(with)) => format!("{with}{}", rest()),
            Some(PathRewrite::Regex {
                pattern,
                replacement,
            }) => pattern.replace(path, replacement.as_str()).into_owned(),
        };

        if rewritten.starts_with('/') {
            rewritten
        } else {
            format!("/{rewritten}")
        }
    }

    /// Full upstream URI for an inbound path and optional query.
    pub fn upstream_uri(&self, path: &str, query: Option<&str>) -> Result<Uri, hyper::http::Error> {
        let upstream_path = self.upstream_path(path);
        let full = match query {
            Some(q) => format!("{}{upstream_path}?{q}", self.target),
            None => format!("{}{upstream_path}", self.target),
        };
        Ok(full.parse::<Uri>()?)
    }
}

fn compile_route(route: &RouteConfig) -> Result<CompiledRoute, ConfigError> {
    let prefix = normalize_prefix(&route.prefix)?;

    let invalid_target = |reason: String| ConfigError::InvalidTarget {
        prefix: route.prefix.clone(),
        target: route.target.clone(),
        reason,
    };

    let uri: Uri = route
        .target
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| invalid_target(e.to_string()))?;
    let scheme = uri
        .scheme_str()
        .ok_or_else(|| invalid_target("missing scheme".to_string()))?;
    let protocol = Protocol::from_scheme(scheme).map_err(invalid_target)?;
    let authority = uri
        .authority()
        .ok_or_else(|| invalid_target("missing host".to_string()))?;
    if uri.query().is_some() {
        return Err(invalid_target("query strings are not allowed".to_string()));
    }

    // Keep any base path on the target, without its trailing slash
    let base_path = uri.path().trim_end_matches('/');
    let target = format!("{}://{}{}", protocol.as_str(), authority, base_path);

    let rewrite = match &route.rewrite {
        None => None,
        Some(RewriteConfig::StripPrefix { strip_prefix }) => {
            strip_prefix.then_some(PathRewrite::StripPrefix)
        }
        Some(RewriteConfig::ReplacePrefix { replace_prefix }) => {
            Some(PathRewrite::ReplacePrefix(replace_prefix.clone()))
        }
        Some(RewriteConfig::Regex {
            pattern,
            replacement,
        }) => {
            let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidRewrite {
                prefix: route.prefix.clone(),
                reason: e.to_string(),
            })?;
            Some(PathRewrite::Regex {
                pattern: regex,
                replacement: replacement.clone(),
            })
        }
    };

    Ok(CompiledRoute {
        prefix,
        target,
        protocol,
        rewrite,
        change_origin: route.change_origin,
        tls_skip_verify: route.tls_skip_verify,
    })
}

fn normalize_prefix(prefix: &str) -> Result<String, ConfigError> {
    if !prefix.starts_with('/') {
        return Err(ConfigError::InvalidPrefix {
            prefix: prefix.to_string(),
            reason: "must start with '/'".to_string(),
        });
    }
    if prefix.contains('?') || prefix.contains('#') {
        return Err(ConfigError::InvalidPrefix {
            prefix: prefix.to_string(),
            reason: "must be a plain path".to_string(),
        });
    }

    let trimmed = prefix.trim_end_matches('/');
    Ok(if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    })
}
