//! Local safety net for extracted text.
//!
//! The model is asked to redact unsafe spans itself; this scrubber is the
//! deterministic second pass for the shapes a regex can recognise reliably
//! (PII and credentials).

pub mod redaction;

pub use redaction::*;
