//! OpenAI-compatible chat-completions generator.

use super::{parse_mock_payload, GenerationError, MockGenerator};
use crate::config::GeneratorConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const DEFAULT_SYSTEM_PROMPT: &str = "You produce realistic example responses for HTTP API \
endpoints that are still under development. Reply with exactly one JSON value and nothing \
else: no explanations, no comments.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Generates mock payloads by asking a chat model to invent the response body.
pub struct ChatCompletionGenerator {
    client: Client,
    endpoint: String,
    config: GeneratorConfig,
}

impl ChatCompletionGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn user_prompt(&self, path: &str) -> String {
        let mut prompt = format!(
            "Generate the JSON response body that the endpoint `{path}` would return on success."
        );
        if let Some(ref context) = self.config.api_context {
            prompt.push_str("\n\nAPI description:\n");
            prompt.push_str(context);
        }
        prompt.push_str("\n\nOutput the JSON directly.");
        prompt
    }
}

#[async_trait]
impl MockGenerator for ChatCompletionGenerator {
    async fn generate(&self, path: &str) -> Result<Value, GenerationError> {
        let system = self
            .config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: self.user_prompt(path),
                },
            ],
            temperature: self.config.temperature,
        };

        debug!(
            "Requesting mock payload for {} from {} (model: {})",
            path, self.endpoint, self.config.model
        );

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(GenerationError::EmptyResponse)?;

        parse_mock_payload(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response};
    use hyper_util::rt::TokioIo;
    use serde_json::json;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    /// Serve one canned reply and record the request body the generator sent.
    async fn fake_backend(
        status: u16,
        reply: Value,
    ) -> (SocketAddr, Arc<Mutex<Option<Value>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let reply = reply.clone();
                let seen = Arc::clone(&seen_clone);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let reply = reply.clone();
                        let seen = Arc::clone(&seen);
                        async move {
                            let body = req.into_body().collect().await.unwrap().to_bytes();
                            *seen.lock().await = serde_json::from_slice(&body).ok();
                            Ok::<_, Infallible>(
                                Response::builder()
                                    .status(status)
                                    .header("content-type", "application/json")
                                    .body(Full::new(Bytes::from(reply.to_string())))
                                    .unwrap(),
                            )
                        }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        (addr, seen)
    }

    fn generator_for(addr: SocketAddr) -> ChatCompletionGenerator {
        ChatCompletionGenerator::new(GeneratorConfig {
            base_url: format!("http://{addr}/v1/"),
            api_key: Some("sk-test".to_string()),
            api_context: Some("User service".to_string()),
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_normalization() {
        let generator = ChatCompletionGenerator::new(GeneratorConfig {
            base_url: "http://localhost:11434/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            generator.endpoint(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_generate_parses_fenced_reply() {
        let (addr, seen) = fake_backend(
            200,
            json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": "```json\n{\"users\": [{\"id\": 1}]}\n```"
                    }
                }]
            }),
        )
        .await;

        let value = generator_for(addr).generate("/users").await.unwrap();
        assert_eq!(value, json!({"users": [{"id": 1}]}));

        let sent = seen.lock().await.clone().unwrap();
        assert_eq!(sent["model"], "gpt-4o-mini");
        assert_eq!(sent["messages"][0]["role"], "system");
        let user = sent["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("/users"));
        assert!(user.contains("User service"));
    }

    #[tokio::test]
    async fn test_generate_non_success_status() {
        let (addr, _) = fake_backend(401, json!({"error": "bad key"})).await;
        let err = generator_for(addr).generate("/users").await.unwrap_err();
        assert!(matches!(err, GenerationError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_generate_empty_choices() {
        let (addr, _) = fake_backend(200, json!({"choices": []})).await;
        let err = generator_for(addr).generate("/users").await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_generate_unparseable_content() {
        let (addr, _) = fake_backend(
            200,
            json!({"choices": [{"message": {"content": "no json here"}}]}),
        )
        .await;
        let err = generator_for(addr).generate("/users").await.unwrap_err();
        assert!(matches!(err, GenerationError::Unparseable(_)));
    }

    #[tokio::test]
    async fn test_generate_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = generator_for(addr).generate("/users").await.unwrap_err();
        assert!(matches!(err, GenerationError::Request(_)));
    }
}
