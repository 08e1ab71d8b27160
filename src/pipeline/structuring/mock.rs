use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use super::types::{StructuredClient, StructuredRequest};
use super::LlmError;

type Responder = dyn Fn(&StructuredRequest) -> Result<Value, LlmError> + Send + Sync;

/// Mock structured client for tests and offline runs.
///
/// Answers every request through a responder closure, counts calls and
/// records the schema name of each request.
pub struct MockStructuredClient {
    responder: Box<Responder>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    schemas: Mutex<Vec<String>>,
}

impl MockStructuredClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&StructuredRequest) -> Result<Value, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: AtomicUsize::new(0),
            schemas: Mutex::new(Vec::new()),
        }
    }

    /// Always returns the same value.
    pub fn canned(value: Value) -> Self {
        Self::new(move |_| Ok(value.clone()))
    }

    /// Always fails with the error built by `make_error`.
    pub fn failing(make_error: fn() -> LlmError) -> Self {
        Self::new(move |_| Err(make_error()))
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn schema_names(&self) -> Vec<String> {
        self.schemas.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl StructuredClient for MockStructuredClient {
    fn complete(&self, request: &StructuredRequest) -> Result<Value, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut schemas) = self.schemas.lock() {
            schemas.push(request.schema_name.clone());
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        (self.responder)(request)
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
