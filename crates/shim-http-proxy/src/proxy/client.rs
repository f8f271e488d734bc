//! Upstream HTTP clients.

use super::tls::NoVerifier;
use crate::config::UpstreamConfig;
use crate::routing::{CompiledRoute, RouteTable};
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Type alias for the HTTP client used by the proxy.
pub type HttpClient = Client<HttpsConnector<HttpConnector>, BoxBody<Bytes, hyper::Error>>;

/// Create a pooled HTTP/1.1 client.
pub fn create_http_client(config: &UpstreamConfig, skip_tls_verify: bool) -> HttpClient {
    let mut http_connector = HttpConnector::new();
    http_connector.set_keepalive(Some(Duration::from_secs(config.keepalive_timeout_secs)));
    http_connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
    http_connector.enforce_http(false); // Allow both HTTP and HTTPS

    let https_connector = if skip_tls_verify {
        warn!("Creating upstream client with TLS certificate verification DISABLED");
        HttpsConnectorBuilder::new()
            .with_tls_config(
                rustls::ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoVerifier))
                    .with_no_client_auth(),
            )
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector)
    } else {
        match HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder
                .https_or_http()
                .enable_http1()
                .wrap_connector(http_connector),
            Err(e) => {
                warn!("Native root certificates unavailable ({}), using bundled roots", e);
                HttpsConnectorBuilder::new()
                    .with_webpki_roots()
                    .https_or_http()
                    .enable_http1()
                    .wrap_connector(http_connector)
            }
        }
    };

    let http_client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .pool_max_idle_per_host(config.max_idle_per_host)
        .build(https_connector);

    info!(
        "Connection pool configured (HTTP/1.1): max_idle={}, idle_timeout={}s, keepalive={}s",
        config.max_idle_per_host, config.idle_timeout_secs, config.keepalive_timeout_secs
    );

    http_client
}

/// One verifying client for every route, plus a non-verifying one that only
/// exists when some HTTPS route sets `tls_skip_verify`.
pub struct UpstreamClients {
    verified: HttpClient,
    insecure: Option<HttpClient>,
}

impl UpstreamClients {
    pub fn new(config: &UpstreamConfig, routes: &RouteTable) -> Self {
        let insecure_routes: Vec<&str> = routes
            .routes()
            .iter()
            .filter(|route| route.skips_tls_verify())
            .map(|route| route.prefix())
            .collect();

        let insecure = if insecure_routes.is_empty() {
            None
        } else {
            warn!(
                "TLS certificate verification disabled for routes: {}",
                insecure_routes.join(", ")
            );
            Some(create_http_client(config, true))
        };

        Self {
            verified: create_http_client(config, false),
            insecure,
        }
    }

    /// Client to forward `route`'s requests with.
    pub fn for_route(&self, route: &CompiledRoute) -> &HttpClient {
        match self.insecure {
            Some(ref insecure) if route.skips_tls_verify() => insecure,
            _ => &self.verified,
        }
    }
}
