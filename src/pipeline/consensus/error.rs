//! Error taxonomy for report generation.
//!
//! Boundary-facing variants (`NotFound`, `Authorization`, `StateConflict`)
//! reject a trigger; the rest end a running job in `FAILED`.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::pipeline::structuring::LlmError;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Classifier output does not conform to the expected schema or contract.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("External service error: {0}")]
    ExternalService(LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Report job cancelled")]
    Cancelled,

    #[error("Report job exceeded its deadline")]
    DeadlineExceeded,
}

impl From<LlmError> for PipelineError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::SchemaViolation { schema, detail } => {
                Self::Validation(format!("{schema}: {detail}"))
            }
            LlmError::MalformedResponse(detail) => Self::Validation(detail),
            LlmError::Cancelled => Self::Cancelled,
            LlmError::DeadlineExceeded => Self::DeadlineExceeded,
            other => Self::ExternalService(other),
        }
    }
}

/// Pipeline stage, used to prefix persisted failure detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classification,
    Extraction,
    Aggregation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Extraction => "extraction",
            Self::Aggregation => "aggregation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure tagged with the stage it happened in.
#[derive(Error, Debug)]
#[error("{stage}: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

impl StageError {
    pub fn new(stage: Stage, source: impl Into<PipelineError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}
