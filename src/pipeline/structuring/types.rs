use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::Value;

use super::batch::fan_out;
use super::LlmError;

/// One structured-output call: instructions, input and the target schema.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub system: String,
    pub user: String,
    pub schema_name: String,
    pub schema: Value,
}

impl StructuredRequest {
    /// Build a request whose schema is generated from `T`.
    pub fn for_type<T: JsonSchema>(schema_name: &str, system: String, user: String) -> Self {
        Self {
            system,
            user,
            schema_name: schema_name.to_string(),
            schema: schema_of::<T>(),
        }
    }
}

/// JSON Schema for `T` with every subschema inlined.
///
/// Providers handle `$ref` unevenly, so enums are expanded in place.
pub fn schema_of<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator();
    let root = generator.into_root_schema_for::<T>();
    serde_json::to_value(root).unwrap_or(Value::Null)
}

/// Controls for a batch of structured calls.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum number of calls in flight.
    pub concurrency: usize,
    pub cancelled: Option<Arc<AtomicBool>>,
    pub deadline: Option<Instant>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            cancelled: None,
            deadline: None,
        }
    }
}

impl BatchOptions {
    /// Checked before every call in the batch.
    pub fn check(&self) -> Result<(), LlmError> {
        if self
            .cancelled
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return Err(LlmError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(LlmError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Structured classification capability.
///
/// `complete` returns one JSON value produced under the request schema.
/// `complete_batch` keeps the input-to-output index mapping regardless of
/// the order in which calls finish.
pub trait StructuredClient: Send + Sync {
    fn complete(&self, request: &StructuredRequest) -> Result<Value, LlmError>;

    fn complete_batch(
        &self,
        requests: &[StructuredRequest],
        options: &BatchOptions,
    ) -> Result<Vec<Value>, LlmError> {
        fan_out(requests, options.concurrency, |_, request| {
            options.check()?;
            self.complete(request)
        })
    }

    /// Provider and model, for logs and the health endpoint.
    fn describe(&self) -> String;
}
