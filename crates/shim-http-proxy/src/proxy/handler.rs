//! Per-request pipeline: route, forward, intercept.

use super::client::UpstreamClients;
use super::forwarding::{error_response, forward_request};
use super::headers::{ShimHeadersExt, TEXT_PLAIN_METRICS, VALUE_TRUE, X_SHIM_UNROUTED};
use super::response_ext::ResponseExt;
use crate::cache::MockCache;
use crate::config::{Config, ConfigError};
use crate::generator::MockGenerator;
use crate::intercept::{InterceptRequest, InterceptionEngine, ProxyBody};
use crate::metrics;
use crate::response::ErrorResponseBuilder;
use crate::routing::RouteTable;
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Everything a request needs, shared by all connections.
pub struct ProxyState {
    pub routes: RouteTable,
    pub engine: InterceptionEngine,
    pub clients: UpstreamClients,
    pub request_timeout: Option<Duration>,
    pub metrics_path: Option<String>,
}

impl ProxyState {
    pub fn from_config(
        config: &Config,
        generator: Arc<dyn MockGenerator>,
    ) -> Result<Self, ConfigError> {
        let routes = RouteTable::new(&config.routes)?;
        let cache = Arc::new(MockCache::new(config.cache.ttl()));
        let engine =
            InterceptionEngine::from_config(&config.intercept, &config.cache, cache, generator)?;
        let clients = UpstreamClients::new(&config.upstream, &routes);

        let request_timeout = match config.upstream.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let metrics_path = config
            .metrics
            .enabled
            .then(|| config.metrics.path.clone());

        Ok(Self {
            routes,
            engine,
            clients,
            request_timeout,
            metrics_path,
        })
    }

    pub fn cache(&self) -> &Arc<MockCache> {
        self.engine.cache()
    }
}

/// Main request handler.
pub async fn handle_request<B>(
    state: &ProxyState,
    req: Request<B>,
) -> Result<Response<ProxyBody>, Infallible>
where
    B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
{
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    if state.metrics_path.as_deref() == Some(path.as_str()) {
        metrics::record_cache(&state.cache().metrics());
        return Ok(metrics_response());
    }

    let Some(route) = state.routes.resolve(&path) else {
        debug!("No route owns {} {}", method, path);
        let response = unrouted_response(&path);
        finish(&method, &response, start, "unrouted");
        return Ok(response);
    };

    let upstream_path = route.upstream_path(&path);

    let client = state.clients.for_route(route);
    let upstream = match forward_request(client, route, req, state.request_timeout).await {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to forward {} {} to {}: {}", method, path, route.target(), e);
            metrics::record_upstream_error(e.kind());
            let response = e.to_response();
            finish(&method, &response, start, "error");
            return Ok(response);
        }
    };

    let request = InterceptRequest {
        method: &method,
        effective_path: &path,
        query: query.as_deref(),
        upstream_path: &upstream_path,
    };

    let (response, outcome) = match state.engine.handle(&request, upstream).await {
        Ok((response, Some(_))) => (response, "mock"),
        Ok((response, None)) => (response, "passthrough"),
        Err(e) => {
            warn!("No mock available for {} {}: {}", method, path, e);
            (
                error_response(StatusCode::BAD_GATEWAY, "generation", &e.to_string()),
                "error",
            )
        }
    };

    finish(&method, &response, start, outcome);
    Ok(response)
}

fn finish(method: &Method, response: &Response<ProxyBody>, start: Instant, outcome: &str) {
    metrics::record_request(method.as_str(), response.status().as_u16());
    metrics::record_proxy_duration(
        method.as_str(),
        start.elapsed().as_secs_f64() * 1000.0,
        outcome,
    );
}

fn unrouted_response(path: &str) -> Response<ProxyBody> {
    let mut response = ErrorResponseBuilder::json_error(
        StatusCode::NOT_FOUND,
        "unrouted",
        &format!("no route configured for {path}"),
    )
    .build_boxed();
    response.set_header(&X_SHIM_UNROUTED, &VALUE_TRUE);
    response
}

fn metrics_response() -> Response<ProxyBody> {
    let mut response = Response::new(Full::new(Bytes::from(metrics::collect_metrics())));
    response.set_header(&CONTENT_TYPE, &TEXT_PLAIN_METRICS);
    response.into_boxed()
}
