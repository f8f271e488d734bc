//! Responses generated locally by the proxy (errors, unrouted requests).

mod builder;

pub use builder::ErrorResponseBuilder;
