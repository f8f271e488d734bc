//! Static header names and values used by the proxy.
//!
//! `from_static` constants avoid runtime `.parse().unwrap()` at insert sites.

use hyper::header::{HeaderName, HeaderValue};
use hyper::Response;

/// Marks a response body as generated rather than served by the upstream.
pub static X_MOCK_DATA: HeaderName = HeaderName::from_static("x-mock-data");
/// Set on the 404 returned for paths no route owns.
pub static X_SHIM_UNROUTED: HeaderName = HeaderName::from_static("x-shim-unrouted");

pub static VALUE_TRUE: HeaderValue = HeaderValue::from_static("true");
pub static APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");
pub static TEXT_PLAIN_METRICS: HeaderValue =
    HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8");

/// Extension trait for inserting static headers into responses.
pub trait ShimHeadersExt {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue);
}

impl<B> ShimHeadersExt for Response<B> {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers_mut().insert(name.clone(), value.clone());
    }
}
