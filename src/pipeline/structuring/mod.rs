//! Structured-output LLM clients.
//!
//! A client takes a prompt plus a JSON Schema and returns one JSON value
//! that the provider was asked to conform to. Conformance is checked again
//! on our side with [`decode`]; nothing here trusts the provider.

pub mod batch;
pub mod decode;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod sanitize;
pub mod types;

pub use batch::*;
pub use decode::*;
pub use mock::*;
pub use ollama::*;
pub use openai::*;
pub use sanitize::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM service is not reachable at {0}")]
    Connection(String),

    #[error("LLM service returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    #[error("Output does not match schema {schema}: {detail}")]
    SchemaViolation { schema: String, detail: String },

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Batch cancelled")]
    Cancelled,

    #[error("Batch deadline exceeded")]
    DeadlineExceeded,
}

/// Shared transport error mapping for the blocking HTTP clients.
pub(crate) fn map_transport_error(e: reqwest::Error, base_url: &str, timeout_secs: u64) -> LlmError {
    if e.is_connect() {
        LlmError::Connection(base_url.to_string())
    } else if e.is_timeout() {
        LlmError::Timeout(timeout_secs)
    } else {
        LlmError::HttpClient(e.to_string())
    }
}
