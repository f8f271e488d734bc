use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::header::CONTENT_TYPE;
use hyper::http::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Response, StatusCode};
use serde_json::json;
use std::convert::Infallible;
use std::str::FromStr;

/// Builder for responses the proxy produces itself rather than relays.
pub struct ErrorResponseBuilder {
    status: StatusCode,
    body: Option<String>,
    headers: HeaderMap,
}

impl ErrorResponseBuilder {
    pub fn new(status_code: StatusCode) -> Self {
        ErrorResponseBuilder {
            status: status_code,
            body: None,
            headers: Default::default(),
        }
    }

    /// JSON error envelope: `{"error": {"kind": ..., "message": ...}}`.
    pub fn json_error(status_code: StatusCode, kind: &str, message: &str) -> Self {
        let body = json!({ "error": { "kind": kind, "message": message } });
        Self::new(status_code)
            .header(CONTENT_TYPE.as_str(), "application/json")
            .body(body.to_string())
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
                self
            }
            _ => self,
        }
    }

    pub fn build_full(self) -> Response<Full<Bytes>> {
        let payload = self.body.map(Bytes::from).unwrap_or_default();
        let mut response = Response::new(Full::new(payload));
        *response.status_mut() = self.status;
        response.headers_mut().extend(self.headers);
        response
    }

    pub fn build_boxed(self) -> Response<BoxBody<Bytes, hyper::Error>> {
        self.build_full()
            .map(|b| b.map_err(|never: Infallible| match never {}).boxed())
    }
}
