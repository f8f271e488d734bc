//! Per-key coalescing of concurrent generations.

use crate::generator::GenerationError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

pub type GenerationResult = Result<Value, GenerationError>;
type SharedGeneration = Shared<BoxFuture<'static, GenerationResult>>;

/// Generations currently running, keyed by cache key.
///
/// The first caller for a key starts the work; later callers for the same key
/// await the same shared future until the owner calls [`finish`](Self::finish).
#[derive(Default)]
pub struct InflightGenerations {
    pending: Mutex<HashMap<String, SharedGeneration>>,
}

impl InflightGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the generation for `key`, starting it with `start` if none is running.
    ///
    /// Returns the shared future and whether this call started it.
    pub fn join_or_start<F>(&self, key: &str, start: F) -> (SharedGeneration, bool)
    where
        F: FnOnce() -> BoxFuture<'static, GenerationResult>,
    {
        let mut pending = self.pending.lock();
        if let Some(existing) = pending.get(key) {
            return (existing.clone(), false);
        }
        let shared = start().shared();
        pending.insert(key.to_string(), shared.clone());
        (shared, true)
    }

    /// Forget the generation for `key` once its result is settled.
    pub fn finish(&self, key: &str) {
        self.pending.lock().remove(key);
    }
}
