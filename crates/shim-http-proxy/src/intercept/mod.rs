//! Response interception.
//!
//! - `matcher` - include/exclude URL patterns
//! - `policy` - status/method pairs that mean "not implemented yet"
//! - `gate` - combines the two into a per-response decision
//! - `engine` - acts on the decision: relay, or drain and serve a mock
//! - `inflight` - coalesces concurrent generations for the same key

mod engine;
mod gate;
mod inflight;
mod matcher;
mod policy;

pub use engine::{InterceptError, InterceptRequest, InterceptionEngine, MockSource, ProxyBody};
pub use gate::{Decision, DecisionGate};
pub use inflight::InflightGenerations;
pub use matcher::{matches, UrlFilter, UrlPattern};
pub use policy::StatusCheckPolicy;
