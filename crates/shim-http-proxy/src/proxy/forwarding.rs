//! Request forwarding to the route's upstream.

use super::client::HttpClient;
use crate::intercept::ProxyBody;
use crate::response::ErrorResponseBuilder;
use crate::routing::CompiledRoute;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes};
use hyper::header::HOST;
use hyper::{Request, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid upstream uri: {0}")]
    InvalidUri(#[from] hyper::http::Error),
    #[error("upstream request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
}

impl ForwardError {
    /// Label used for metrics and the JSON error body.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::InvalidUri(_) => "request",
            ForwardError::Transport(_) => "transport",
            ForwardError::Timeout(_) => "timeout",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn to_response(&self) -> Response<ProxyBody> {
        error_response(self.status(), "upstream", &self.to_string())
    }
}

/// JSON error response for failures the proxy reports itself.
pub fn error_response(status: StatusCode, kind: &str, message: &str) -> Response<ProxyBody> {
    ErrorResponseBuilder::json_error(status, kind, message).build_boxed()
}

/// Forward `req` to the upstream owning it, streaming the body both ways.
///
/// The path is rewritten per the route and the query is kept verbatim. With
/// `change_origin` the inbound `Host` is dropped so the client derives it from
/// the target. `timeout` bounds the wait for the response head only.
pub async fn forward_request<B>(
    http_client: &HttpClient,
    route: &CompiledRoute,
    req: Request<B>,
    timeout: Option<Duration>,
) -> Result<Response<ProxyBody>, ForwardError>
where
    B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
{
    let (mut parts, body) = req.into_parts();
    let upstream_uri = route.upstream_uri(parts.uri.path(), parts.uri.query())?;

    debug!("Forwarding {} {} -> {}", parts.method, parts.uri, upstream_uri);

    parts.uri = upstream_uri;
    if route.change_origin() {
        parts.headers.remove(HOST);
    }

    let pending = http_client.request(Request::from_parts(parts, BoxBody::new(body)));
    let response = match timeout {
        Some(limit) => tokio::time::timeout(limit, pending)
            .await
            .map_err(|_| ForwardError::Timeout(limit))??,
        None => pending.await?,
    };

    Ok(response.map(BoxBody::new))
}
