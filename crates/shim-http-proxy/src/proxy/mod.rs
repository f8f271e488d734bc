//! Proxy server module.
//!
//! # Module Structure
//!
//! - `server` - ProxyServer lifecycle and accept loop
//! - `handler` - per-request pipeline (route, forward, intercept)
//! - `forwarding` - streaming request forwarding to upstreams
//! - `client` - pooled upstream HTTP client
//! - `tls` - certificate verifier for `tls_skip_verify`
//! - `network` - listener creation

mod client;
mod forwarding;
mod handler;
pub(crate) mod headers;
mod network;
pub(crate) mod response_ext;
mod server;
mod tls;


pub use client::{create_http_client, HttpClient, UpstreamClients};
pub use forwarding::{error_response, forward_request, ForwardError};
pub use handler::{handle_request, ProxyState};
pub use server::{ProxyError, ProxyServer};
