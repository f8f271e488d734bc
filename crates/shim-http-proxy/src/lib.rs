//! Shim: an HTTP proxy that fills in for upstream endpoints that do not
//! exist yet.
//!
//! Requests are forwarded to the route's upstream. When the upstream answers
//! with a "not implemented yet" status for an eligible method and path, the
//! real response is discarded and a generated JSON payload is served instead,
//! marked with `x-mock-data: true`. Generated payloads are cached per path
//! until the TTL elapses or the upstream starts answering for real.

pub mod cache;
pub mod config;
pub mod generator;
pub mod intercept;
pub mod metrics;
pub mod proxy;
pub mod response;
pub mod routing;

pub use cache::MockCache;
pub use config::Config;
pub use generator::{ChatCompletionGenerator, GenerationError, MockGenerator};
pub use proxy::{ProxyError, ProxyServer};
