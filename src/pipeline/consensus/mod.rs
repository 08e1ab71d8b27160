//! Discussion consensus report pipeline.
//!
//! Classifier → per-message dimension extractor → aggregator, run as a
//! checkpointed background job per trigger.

pub mod aggregator;
pub mod classifier;
pub mod control;
pub mod error;
pub mod extractor;
pub mod jobs;
pub mod orchestrator;
pub mod prompt;
pub mod store;
pub mod trigger;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::aggregate;
pub use classifier::{resolve_category, Resolution, ResolvedCategory};
pub use control::JobControl;
pub use error::{PipelineError, Stage, StageError};
pub use extractor::extract_dimensions;
pub use jobs::JobRegistry;
pub use orchestrator::{run_report_job, JobOutcome, ReportJob};
pub use store::ReportStore;
pub use trigger::{ReportService, ReportSettings, StartedJob};
pub use types::*;
