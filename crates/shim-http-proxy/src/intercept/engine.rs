//! Post-upstream processing: relay the real response or substitute a mock.

use super::gate::{Decision, DecisionGate};
use super::inflight::{GenerationResult, InflightGenerations};
use crate::cache::{cache_key, MockCache};
use crate::config::{CacheConfig, ConfigError, InterceptConfig};
use crate::generator::{GenerationError, MockGenerator};
use crate::metrics;
use crate::proxy::headers::{ShimHeadersExt, APPLICATION_JSON, VALUE_TRUE, X_MOCK_DATA};
use crate::proxy::response_ext::ResponseExt;
use futures::FutureExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Response};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// What the engine needs to know about the inbound request.
#[derive(Debug, Clone, Copy)]
pub struct InterceptRequest<'a> {
    pub method: &'a Method,
    /// Path the client asked for, route prefix included.
    pub effective_path: &'a str,
    pub query: Option<&'a str>,
    /// Path after rewrite, as sent upstream. This is what the generator sees.
    pub upstream_path: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockSource {
    Cache,
    Generated,
}

impl MockSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MockSource::Cache => "cache",
            MockSource::Generated => "generated",
        }
    }
}

pub struct InterceptionEngine {
    gate: DecisionGate,
    cache: Arc<MockCache>,
    generator: Arc<dyn MockGenerator>,
    include_query: bool,
    inflight: Option<Arc<InflightGenerations>>,
}

impl InterceptionEngine {
    pub fn new(
        gate: DecisionGate,
        cache: Arc<MockCache>,
        generator: Arc<dyn MockGenerator>,
        include_query: bool,
        single_flight: bool,
    ) -> Self {
        Self {
            gate,
            cache,
            generator,
            include_query,
            inflight: single_flight.then(|| Arc::new(InflightGenerations::new())),
        }
    }

    pub fn from_config(
        intercept: &InterceptConfig,
        cache_config: &CacheConfig,
        cache: Arc<MockCache>,
        generator: Arc<dyn MockGenerator>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            DecisionGate::from_config(intercept)?,
            cache,
            generator,
            cache_config.include_query,
            cache_config.single_flight,
        ))
    }

    pub fn cache(&self) -> &Arc<MockCache> {
        &self.cache
    }

    /// Turn the upstream response into the response the client receives.
    ///
    /// Passthrough invalidates the cached mock for this request and returns
    /// `upstream` untouched with no [`MockSource`]. Intercept drains the
    /// upstream body, then serves a cached or freshly generated payload. A
    /// generation failure leaves the cache as it was.
    pub async fn handle(
        &self,
        request: &InterceptRequest<'_>,
        upstream: Response<ProxyBody>,
    ) -> Result<(Response<ProxyBody>, Option<MockSource>), InterceptError> {
        let status = upstream.status();
        let decision = self
            .gate
            .decide(request.method, status, request.effective_path);
        metrics::record_decision(decision.as_str());

        let key = cache_key(request.effective_path, request.query, self.include_query);

        match decision {
            Decision::Passthrough => {
                self.cache.delete(&key);
                trace!("Passing through {} {} ({})", request.method, key, status);
                Ok((upstream, None))
            }
            Decision::Intercept => {
                info!(
                    "Intercepting {} {} (upstream status {})",
                    request.method, key, status
                );

                match drain_body(upstream.into_body()).await {
                    Ok(drained) => trace!("Drained {} bytes of upstream body", drained),
                    Err(e) => warn!("Failed to drain upstream body for {}: {}", key, e),
                }

                let (payload, source) = self.mock_payload(&key, request.upstream_path).await?;
                metrics::record_mock_response(source.as_str());
                debug!("Serving {} mock for {}", source.as_str(), key);
                Ok((mock_response(&payload), Some(source)))
            }
        }
    }

    async fn mock_payload(
        &self,
        key: &str,
        upstream_path: &str,
    ) -> Result<(Value, MockSource), GenerationError> {
        if let Some(cached) = self.cache.get(key) {
            return Ok((cached, MockSource::Cache));
        }

        let value = match self.inflight {
            Some(ref inflight) => {
                let (generation, started) = inflight.join_or_start(key, || {
                    self.spawn_generation(key, upstream_path).boxed()
                });
                if !started {
                    debug!("Joining in-flight generation for {}", key);
                }
                generation.await?
            }
            None => self.spawn_generation(key, upstream_path).await?,
        };

        Ok((value, MockSource::Generated))
    }

    /// Run the generator on its own task so that a disconnecting client does
    /// not cancel it. The task stores a successful result in the cache unless
    /// the key was invalidated while it ran.
    fn spawn_generation(
        &self,
        key: &str,
        upstream_path: &str,
    ) -> impl Future<Output = GenerationResult> + Send + 'static {
        let generator = Arc::clone(&self.generator);
        let reservation = self.cache.reserve(key);
        let inflight = self.inflight.clone();
        let task_key = key.to_string();
        let path = upstream_path.to_string();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = generator.generate(&path).await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            metrics::record_generation(elapsed_ms, result.is_ok());

            match result {
                Ok(ref value) => {
                    if reservation.fill(value.clone()) {
                        info!("Generated mock for {} in {:.0}ms", task_key, elapsed_ms);
                    } else {
                        info!(
                            "Generated mock for {} in {:.0}ms, not cached: upstream answered meanwhile",
                            task_key, elapsed_ms
                        );
                    }
                }
                Err(ref e) => {
                    drop(reservation);
                    error!("Mock generation for {} failed: {}", task_key, e);
                }
            }

            if let Some(inflight) = inflight {
                inflight.finish(&task_key);
            }
            result
        });

        let inflight = self.inflight.clone();
        let key = key.to_string();
        async move {
            task.await.unwrap_or_else(|e| {
                if let Some(inflight) = inflight {
                    inflight.finish(&key);
                }
                Err(GenerationError::Task(e.to_string()))
            })
        }
    }
}

/// Read the body to its end, discarding data as it arrives.
async fn drain_body(mut body: ProxyBody) -> Result<usize, hyper::Error> {
    let mut drained = 0;
    while let Some(frame) = body.frame().await {
        if let Some(data) = frame?.data_ref() {
            drained += data.len();
        }
    }
    Ok(drained)
}

fn mock_response(payload: &Value) -> Response<ProxyBody> {
    let mut response = Response::new(Full::new(Bytes::from(payload.to_string()))).into_boxed();
    response.set_header(&CONTENT_TYPE, &APPLICATION_JSON);
    response.set_header(&X_MOCK_DATA, &VALUE_TRUE);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::{StatusCheckPolicy, UrlFilter, UrlPattern};
    use async_trait::async_trait;
    use hyper::body::{Body, Frame};
    use hyper::StatusCode;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;

    struct StubGenerator {
        reply: Result<Value, GenerationError>,
        delay: Duration,
        calls: AtomicUsize,
        paths: parking_lot::Mutex<Vec<String>>,
    }

    impl StubGenerator {
        fn ok(value: Value) -> Arc<Self> {
            Self::with(Ok(value), Duration::ZERO)
        }

        fn with(reply: Result<Value, GenerationError>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply,
                delay,
                calls: AtomicUsize::new(0),
                paths: parking_lot::Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MockGenerator for StubGenerator {
        async fn generate(&self, path: &str) -> Result<Value, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.paths.lock().push(path.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone()
        }
    }

    /// Body that flags when it has been read to the end.
    struct TrackedBody {
        chunks: VecDeque<Bytes>,
        finished: Arc<AtomicBool>,
    }

    impl Body for TrackedBody {
        type Data = Bytes;
        type Error = hyper::Error;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, hyper::Error>>> {
            match self.chunks.pop_front() {
                Some(chunk) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
                None => {
                    self.finished.store(true, Ordering::SeqCst);
                    Poll::Ready(None)
                }
            }
        }
    }

    fn engine_with(generator: Arc<StubGenerator>, single_flight: bool) -> InterceptionEngine {
        InterceptionEngine::new(
            DecisionGate::new(true, StatusCheckPolicy::default(), UrlFilter::default()),
            Arc::new(MockCache::new(Duration::from_secs(60))),
            generator,
            true,
            single_flight,
        )
    }

    fn upstream(status: u16, body: &'static str) -> Response<ProxyBody> {
        Response::builder()
            .status(status)
            .header("content-type", "text/plain")
            .header("x-upstream", "yes")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
            .into_boxed()
    }

    static GET: Method = Method::GET;
    static POST: Method = Method::POST;

    fn get_users() -> InterceptRequest<'static> {
        InterceptRequest {
            method: &GET,
            effective_path: "/api/users",
            query: None,
            upstream_path: "/users",
        }
    }

    async fn body_json(response: Response<ProxyBody>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_mocked() {
        let generator = StubGenerator::ok(json!([{"id": 1, "name": "Ada"}]));
        let engine = engine_with(Arc::clone(&generator), true);

        let (response, source) = engine
            .handle(&get_users(), upstream(404, "Not Found"))
            .await
            .unwrap();

        assert_eq!(source, Some(MockSource::Generated));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(&X_MOCK_DATA).unwrap(), "true");
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert!(response.headers().get("x-upstream").is_none());
        assert_eq!(body_json(response).await, json!([{"id": 1, "name": "Ada"}]));

        assert_eq!(*generator.paths.lock(), vec!["/users".to_string()]);
        assert_eq!(
            engine.cache().get("/api/users"),
            Some(json!([{"id": 1, "name": "Ada"}]))
        );
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_interception_is_logged() {
        let engine = engine_with(StubGenerator::ok(json!({})), true);
        engine
            .handle(&get_users(), upstream(404, "Not Found"))
            .await
            .unwrap();

        assert!(logs_contain("Intercepting GET /api/users (upstream status 404 Not Found)"));
    }

    #[tokio::test]
    async fn test_cached_mock_is_reused() {
        let generator = StubGenerator::ok(json!({"total": 3}));
        let engine = engine_with(Arc::clone(&generator), true);

        let mut sources = Vec::new();
        for _ in 0..3 {
            let (response, source) = engine
                .handle(&get_users(), upstream(404, "Not Found"))
                .await
                .unwrap();
            sources.extend(source);
            assert_eq!(body_json(response).await, json!({"total": 3}));
        }
        assert_eq!(generator.calls(), 1);
        assert_eq!(
            sources,
            vec![MockSource::Generated, MockSource::Cache, MockSource::Cache]
        );
    }

    #[tokio::test]
    async fn test_passthrough_invalidates_and_preserves_response() {
        let generator = StubGenerator::ok(json!({"mock": true}));
        let engine = engine_with(Arc::clone(&generator), true);
        engine.cache().set("/api/users", json!({"mock": true}));

        let (response, source) = engine
            .handle(&get_users(), upstream(200, "real users"))
            .await
            .unwrap();

        assert!(source.is_none());
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(&X_MOCK_DATA).is_none());
        assert_eq!(response.headers().get("x-upstream").unwrap(), "yes");
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"real users");

        assert!(engine.cache().get("/api/users").is_none());
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_matching_status_passes_through() {
        let generator = StubGenerator::ok(json!({}));
        let engine = engine_with(Arc::clone(&generator), true);

        let (response, _) = engine
            .handle(&get_users(), upstream(500, "boom"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let post = InterceptRequest {
            method: &POST,
            ..get_users()
        };
        let (response, _) = engine.handle(&post, upstream(404, "nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_excluded_path_passes_through() {
        let generator = StubGenerator::ok(json!({}));
        let engine = InterceptionEngine::new(
            DecisionGate::new(
                true,
                StatusCheckPolicy::default(),
                UrlFilter::new(vec![], vec![UrlPattern::Literal("/api/users".to_string())]),
            ),
            Arc::new(MockCache::new(Duration::from_secs(60))),
            generator.clone(),
            true,
            true,
        );

        let (response, source) = engine
            .handle(&get_users(), upstream(404, "Not Found"))
            .await
            .unwrap();
        assert!(source.is_none());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_intercepted_body_is_drained() {
        let engine = engine_with(StubGenerator::ok(json!({"ok": true})), true);
        let finished = Arc::new(AtomicBool::new(false));
        let body = TrackedBody {
            chunks: VecDeque::from(vec![
                Bytes::from_static(b"<html>"),
                Bytes::from_static(b"Not Found"),
                Bytes::from_static(b"</html>"),
            ]),
            finished: Arc::clone(&finished),
        };
        let mut response = Response::new(BoxBody::new(body));
        *response.status_mut() = StatusCode::NOT_FOUND;

        let (mocked, _) = engine.handle(&get_users(), response).await.unwrap();
        assert_eq!(mocked.status(), StatusCode::OK);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_generation_failure_leaves_cache_untouched() {
        let generator = StubGenerator::with(
            Err(GenerationError::Status {
                status: 500,
                body: "overloaded".to_string(),
            }),
            Duration::ZERO,
        );
        let engine = engine_with(Arc::clone(&generator), true);

        let err = engine
            .handle(&get_users(), upstream(404, "Not Found"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InterceptError::Generation(GenerationError::Status { status: 500, .. })
        ));
        assert_eq!(engine.cache().size(), 0);

        // Nothing cached, so the next miss asks the generator again
        let _ = engine.handle(&get_users(), upstream(404, "Not Found")).await;
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_generation() {
        let generator = StubGenerator::with(Ok(json!({"id": 7})), Duration::from_millis(100));
        let engine = Arc::new(engine_with(Arc::clone(&generator), true));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let (response, _) = engine
                        .handle(&get_users(), upstream(404, "Not Found"))
                        .await
                        .unwrap();
                    body_json(response).await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), json!({"id": 7}));
        }
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_without_single_flight_each_miss_generates() {
        let generator = StubGenerator::with(Ok(json!({"id": 7})), Duration::from_millis(100));
        let engine = Arc::new(engine_with(Arc::clone(&generator), false));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    engine
                        .handle(&get_users(), upstream(404, "Not Found"))
                        .await
                        .map(|(r, _)| r.status())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), StatusCode::OK);
        }
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn test_abandoned_request_still_populates_cache() {
        let generator = StubGenerator::with(Ok(json!({"late": true})), Duration::from_millis(80));
        let engine = engine_with(Arc::clone(&generator), true);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            engine.handle(&get_users(), upstream(404, "Not Found")),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(engine.cache().get("/api/users"), Some(json!({"late": true})));
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_query_is_part_of_cache_key() {
        let generator = StubGenerator::ok(json!({"page": "any"}));
        let engine = engine_with(Arc::clone(&generator), true);

        for query in ["page=1", "page=2", "page=1"] {
            let request = InterceptRequest {
                query: Some(query),
                ..get_users()
            };
            engine
                .handle(&request, upstream(404, "Not Found"))
                .await
                .unwrap();
        }

        assert_eq!(generator.calls(), 2);
        assert!(engine.cache().get("/api/users?page=1").is_some());
        assert!(engine.cache().get("/api/users?page=2").is_some());
    }

    #[tokio::test]
    async fn test_live_response_during_generation_is_not_overwritten() {
        let generator = StubGenerator::with(Ok(json!({"mock": true})), Duration::from_millis(100));
        let engine = Arc::new(engine_with(Arc::clone(&generator), true));

        let pending = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .handle(&get_users(), upstream(404, "Not Found"))
                    .await
                    .map(|(response, source)| (response.status(), source))
            })
        };

        // Backend ships the endpoint while the mock is still being generated
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (live, source) = engine
            .handle(&get_users(), upstream(200, "real users"))
            .await
            .unwrap();
        assert_eq!(live.status(), StatusCode::OK);
        assert!(source.is_none());

        // The request that saw the 404 still gets its mock
        let (status, source) = pending.await.unwrap().unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(source, Some(MockSource::Generated));

        assert!(engine.cache().get("/api/users").is_none());
        assert_eq!(engine.cache().metrics().stale_writes, 1);
    }

    #[tokio::test]
    async fn test_upstream_marker_header_is_still_passthrough() {
        let engine = engine_with(StubGenerator::ok(json!({})), true);
        let mut live = upstream(200, "real users");
        live.set_header(&X_MOCK_DATA, &VALUE_TRUE);

        let (response, source) = engine.handle(&get_users(), live).await.unwrap();
        assert!(source.is_none());
        assert_eq!(response.headers().get(&X_MOCK_DATA).unwrap(), "true");
    }
}
