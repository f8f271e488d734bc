//! Mock generator adapters.
//!
//! The interception engine only sees [`MockGenerator`]: an async function from
//! an API path to a JSON value. [`ChatCompletionGenerator`] is the bundled
//! implementation backed by an OpenAI-compatible chat-completions endpoint.

mod extract;
mod openai;

pub use extract::parse_mock_payload;
pub use openai::ChatCompletionGenerator;

use async_trait::async_trait;
use serde_json::Value;

/// Why a mock payload could not be produced.
///
/// `Clone` so that one failed generation can be reported to every request
/// waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("generator request failed: {0}")]
    Request(String),
    #[error("generator returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generator returned no content")]
    EmptyResponse,
    #[error("generator output is not valid JSON: {0}")]
    Unparseable(String),
    #[error("generator backend error: {0}")]
    Backend(String),
    #[error("generation task failed: {0}")]
    Task(String),
}

/// Produces a mock JSON payload for an API path.
#[async_trait]
pub trait MockGenerator: Send + Sync {
    async fn generate(&self, path: &str) -> Result<Value, GenerationError>;
}
