//! Sequential report job: classify, extract, aggregate.
//!
//! Each stage boundary is a persisted checkpoint. A checkpoint that no
//! longer matches the row means another job took over, and this one stops
//! without touching the discussion again.

use std::time::Instant;

use uuid::Uuid;

use super::aggregator::aggregate;
use super::classifier::resolve_category;
use super::control::JobControl;
use super::error::{PipelineError, Stage, StageError};
use super::extractor::extract_dimensions;
use super::store::ReportStore;
use crate::models::enums::{Category, ReportState};
use crate::pipeline::structuring::StructuredClient;

/// Error text persisted for cooperative cancellation.
pub const CANCELLED_ERROR: &str = "cancelled";

/// Identity and limits of one job run.
#[derive(Debug, Clone)]
pub struct ReportJob {
    pub discussion_id: Uuid,
    pub job_id: Uuid,
    pub control: JobControl,
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Persisted failure detail.
    Failed(String),
    /// Another job owns the discussion; nothing was written.
    Superseded,
}

enum Flow {
    Done,
    Superseded,
}

fn checkpoint(
    store: &dyn ReportStore,
    job: &ReportJob,
    stage: Stage,
    state: ReportState,
    category: Option<Category>,
    report: Option<&serde_json::Value>,
) -> Result<bool, StageError> {
    store
        .checkpoint(&job.discussion_id, &job.job_id, state, category, report)
        .map_err(|e| StageError::new(stage, e))
}

fn run_stages(
    store: &dyn ReportStore,
    client: &dyn StructuredClient,
    job: &ReportJob,
) -> Result<Flow, StageError> {
    let control = &job.control;

    // Classification
    let started = Instant::now();
    let stage = Stage::Classification;
    control.check().map_err(|e| StageError::new(stage, e))?;
    let discussion = store
        .load_discussion(&job.discussion_id)
        .map_err(|e| StageError::new(stage, e))?
        .ok_or_else(|| {
            StageError::new(
                stage,
                PipelineError::NotFound {
                    entity: "Discussion",
                    id: job.discussion_id.to_string(),
                },
            )
        })?;
    let messages = store
        .load_messages(&job.discussion_id)
        .map_err(|e| StageError::new(stage, e))?;
    let resolved = resolve_category(&discussion, client).map_err(|e| StageError::new(stage, e))?;
    if !checkpoint(store, job, stage, ReportState::CategoryResolved, Some(resolved.category), None)? {
        return Ok(Flow::Superseded);
    }
    tracing::info!(
        discussion_id = %job.discussion_id,
        job_id = %job.job_id,
        stage = stage.as_str(),
        category = %resolved.category,
        resolution = resolved.resolution.as_str(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Category resolved"
    );

    // Extraction
    let started = Instant::now();
    let stage = Stage::Extraction;
    control.check().map_err(|e| StageError::new(stage, e))?;
    let records = extract_dimensions(
        resolved.category,
        &discussion,
        &messages,
        client,
        control,
        job.concurrency,
    )
    .map_err(|e| StageError::new(stage, e))?;
    if !checkpoint(store, job, stage, ReportState::DimensionsExtracted, None, None)? {
        return Ok(Flow::Superseded);
    }
    tracing::info!(
        discussion_id = %job.discussion_id,
        job_id = %job.job_id,
        stage = stage.as_str(),
        records = records.len(),
        redacted = records.iter().filter(|r| r.common.risk_flag).count(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Dimensions extracted"
    );

    // Aggregation
    let started = Instant::now();
    let stage = Stage::Aggregation;
    control.check().map_err(|e| StageError::new(stage, e))?;
    let report = aggregate(&discussion, resolved.category, &records)
        .map_err(|e| StageError::new(stage, e))?;
    let report = serde_json::to_value(&report)
        .map_err(|e| StageError::new(stage, PipelineError::Validation(e.to_string())))?;
    if !checkpoint(store, job, stage, ReportState::Complete, None, Some(&report))? {
        return Ok(Flow::Superseded);
    }
    tracing::info!(
        discussion_id = %job.discussion_id,
        job_id = %job.job_id,
        stage = stage.as_str(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Report complete"
    );

    Ok(Flow::Done)
}

/// Run one report job to a terminal outcome. Never panics on stage errors;
/// every failure is persisted as `FAILED` unless the job was superseded.
pub fn run_report_job(
    store: &dyn ReportStore,
    client: &dyn StructuredClient,
    job: &ReportJob,
) -> JobOutcome {
    let started = Instant::now();
    tracing::info!(
        discussion_id = %job.discussion_id,
        job_id = %job.job_id,
        llm = %client.describe(),
        "Report job started"
    );

    let error = match run_stages(store, client, job) {
        Ok(Flow::Done) => {
            tracing::info!(
                discussion_id = %job.discussion_id,
                job_id = %job.job_id,
                duration_ms = started.elapsed().as_millis() as u64,
                "Report job finished"
            );
            return JobOutcome::Completed;
        }
        Ok(Flow::Superseded) => {
            tracing::info!(
                discussion_id = %job.discussion_id,
                job_id = %job.job_id,
                "Report job superseded, stopping"
            );
            return JobOutcome::Superseded;
        }
        Err(e) => e,
    };

    let detail = match error.source {
        PipelineError::Cancelled => CANCELLED_ERROR.to_string(),
        _ => error.to_string(),
    };
    tracing::warn!(
        discussion_id = %job.discussion_id,
        job_id = %job.job_id,
        stage = error.stage.as_str(),
        error = %detail,
        "Report job failed"
    );

    match store.fail(&job.discussion_id, &job.job_id, &detail) {
        Ok(true) => JobOutcome::Failed(detail),
        Ok(false) => JobOutcome::Superseded,
        Err(e) => {
            tracing::error!(
                discussion_id = %job.discussion_id,
                job_id = %job.job_id,
                error = %e,
                "Could not persist report failure"
            );
            JobOutcome::Failed(detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;
    use crate::db::{Database, DatabaseError};
    use crate::models::enums::DiscussionTemplate;
    use crate::models::{Discussion, Message, ReportStatus};
    use crate::pipeline::consensus::testing::{echo_client, seed};
    use crate::pipeline::structuring::{LlmError, MockStructuredClient};

    /// Database store that remembers every accepted checkpoint.
    struct Recording {
        db: Database,
        progress: Mutex<Vec<f64>>,
    }

    impl Recording {
        fn new() -> Self {
            Self {
                db: Database::open_in_memory().unwrap(),
                progress: Mutex::new(Vec::new()),
            }
        }

        fn observe(&self, id: &Uuid) {
            if let Some(p) = self.db.status(id).unwrap().and_then(|s| s.report_progress) {
                self.progress.lock().unwrap().push(p);
            }
        }
    }

    impl ReportStore for Recording {
        fn load_discussion(&self, id: &Uuid) -> Result<Option<Discussion>, DatabaseError> {
            self.db.load_discussion(id)
        }
        fn load_messages(&self, id: &Uuid) -> Result<Vec<Message>, DatabaseError> {
            self.db.load_messages(id)
        }
        fn begin(&self, id: &Uuid, job: &Uuid, reject: bool) -> Result<bool, DatabaseError> {
            let ok = self.db.begin(id, job, reject)?;
            self.observe(id);
            Ok(ok)
        }
        fn checkpoint(
            &self,
            id: &Uuid,
            job: &Uuid,
            state: ReportState,
            category: Option<Category>,
            report: Option<&Value>,
        ) -> Result<bool, DatabaseError> {
            let ok = self.db.checkpoint(id, job, state, category, report)?;
            self.observe(id);
            Ok(ok)
        }
        fn fail(&self, id: &Uuid, job: &Uuid, error: &str) -> Result<bool, DatabaseError> {
            self.db.fail(id, job, error)
        }
        fn status(&self, id: &Uuid) -> Result<Option<ReportStatus>, DatabaseError> {
            self.db.status(id)
        }
        fn recover_interrupted(&self) -> Result<usize, DatabaseError> {
            self.db.recover_interrupted()
        }
    }

    fn start(store: &dyn ReportStore, discussion_id: Uuid) -> ReportJob {
        let job = ReportJob {
            discussion_id,
            job_id: Uuid::new_v4(),
            control: JobControl::new(Duration::from_secs(60)),
            concurrency: 2,
        };
        assert!(store.begin(&discussion_id, &job.job_id, true).unwrap());
        job
    }

    #[test]
    fn template_discussion_completes_without_classification_call() {
        let store = Recording::new();
        let d = seed(
            &store.db,
            Some(DiscussionTemplate::FeaturePrioritization),
            &["Search first", "Search is table stakes", "Dark mode later"],
        );
        let client = echo_client(Category::BinaryProposal);
        let job = start(&store, d.id);

        assert_eq!(run_report_job(&store, &client, &job), JobOutcome::Completed);
        // Three extraction calls, no classification call.
        assert_eq!(client.call_count(), 3);
        assert!(client.schema_names().iter().all(|s| s == "prioritization_ranking_dimensions"));

        let status = store.status(&d.id).unwrap().unwrap();
        assert_eq!(status.state, Some(ReportState::Complete));
        assert_eq!(status.report_progress, Some(1.0));
        assert_eq!(status.category, Some(Category::PrioritizationRanking));
        let report = status.report.unwrap();
        let counts = report["payload"]["option_counts"].as_object().unwrap();
        assert_eq!(counts.values().map(|v| v.as_u64().unwrap()).sum::<u64>(), 3);
        assert_eq!(report["payload"]["dimension"], "priority_class");
    }

    #[test]
    fn progress_is_monotonic_across_checkpoints() {
        let store = Recording::new();
        let d = seed(&store.db, None, &["one", "two"]);
        let client = echo_client(Category::ForecastingPlanning);
        let job = start(&store, d.id);

        assert_eq!(run_report_job(&store, &client, &job), JobOutcome::Completed);
        assert_eq!(*store.progress.lock().unwrap(), vec![0.0, 0.1, 0.5, 1.0]);
        assert_eq!(
            store.status(&d.id).unwrap().unwrap().category,
            Some(Category::ForecastingPlanning)
        );
    }

    #[test]
    fn email_never_reaches_persisted_report() {
        let store = Recording::new();
        let d = seed(
            &store.db,
            Some(DiscussionTemplate::ToolAdoption),
            &["Yes, ping me at jane.doe@example.com to help roll it out"],
        );
        // The model misses the email; the local scrubber still catches it.
        let client = echo_client(Category::BinaryProposal);
        let job = start(&store, d.id);

        assert_eq!(run_report_job(&store, &client, &job), JobOutcome::Completed);
        let status = store.status(&d.id).unwrap().unwrap();
        let persisted = status.report.unwrap().to_string();
        assert!(!persisted.contains("jane.doe@example.com"));
        assert!(persisted.contains("[REDACTED]"));
    }

    #[test]
    fn inferred_category_is_used_without_template() {
        let store = Recording::new();
        let d = seed(&store.db, None, &["We should adopt it"]);
        let client = echo_client(Category::BinaryProposal);
        let job = start(&store, d.id);

        assert_eq!(run_report_job(&store, &client, &job), JobOutcome::Completed);
        assert_eq!(client.call_count(), 2);
        assert_eq!(client.schema_names()[0], "category_output");
    }

    #[test]
    fn novel_category_fails_classification_stage() {
        let store = Recording::new();
        let d = seed(&store.db, None, &["hello"]);
        let client = MockStructuredClient::canned(json!({ "category": "GENERAL_CHAT" }));
        let job = start(&store, d.id);

        let outcome = run_report_job(&store, &client, &job);
        let JobOutcome::Failed(detail) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(detail.starts_with("classification: "), "{detail}");

        let status = store.status(&d.id).unwrap().unwrap();
        assert_eq!(status.state, Some(ReportState::Failed));
        assert_eq!(status.report_progress, None);
        assert!(status.report.is_none());
        assert_eq!(status.error.as_deref(), Some(detail.as_str()));
    }

    #[test]
    fn extraction_outage_fails_with_stage_prefix() {
        let store = Recording::new();
        let d = seed(&store.db, Some(DiscussionTemplate::PolicyFeedback), &["a", "b"]);
        let client = MockStructuredClient::failing(|| LlmError::Timeout(30));
        let job = start(&store, d.id);

        let JobOutcome::Failed(detail) = run_report_job(&store, &client, &job) else {
            panic!("expected failure");
        };
        assert!(detail.starts_with("extraction: "), "{detail}");
        // Progress reached CATEGORY_RESOLVED before the failure.
        assert_eq!(*store.progress.lock().unwrap(), vec![0.0, 0.1]);
        assert_eq!(
            store.status(&d.id).unwrap().unwrap().state,
            Some(ReportState::Failed)
        );
    }

    #[test]
    fn cancelled_job_persists_cancelled() {
        let store = Recording::new();
        let d = seed(&store.db, Some(DiscussionTemplate::ToolAdoption), &["a"]);
        let client = echo_client(Category::BinaryProposal);
        let job = start(&store, d.id);
        job.control.cancel();

        assert_eq!(
            run_report_job(&store, &client, &job),
            JobOutcome::Failed(CANCELLED_ERROR.into())
        );
        assert_eq!(client.call_count(), 0);
        assert_eq!(
            store.status(&d.id).unwrap().unwrap().error.as_deref(),
            Some(CANCELLED_ERROR)
        );
    }

    #[test]
    fn expired_deadline_fails_job() {
        let store = Recording::new();
        let d = seed(&store.db, Some(DiscussionTemplate::ToolAdoption), &["a"]);
        let client = echo_client(Category::BinaryProposal);
        let mut job = start(&store, d.id);
        job.control = JobControl::new(Duration::ZERO);

        let JobOutcome::Failed(detail) = run_report_job(&store, &client, &job) else {
            panic!("expected failure");
        };
        assert!(detail.contains("deadline"), "{detail}");
    }

    #[test]
    fn superseded_job_stops_without_writing() {
        let store = Recording::new();
        let d = seed(&store.db, Some(DiscussionTemplate::ToolAdoption), &["a"]);
        let client = echo_client(Category::BinaryProposal);
        let old = start(&store, d.id);
        let newer = Uuid::new_v4();
        assert!(store.begin(&d.id, &newer, false).unwrap());

        assert_eq!(run_report_job(&store, &client, &old), JobOutcome::Superseded);
        let status = store.status(&d.id).unwrap().unwrap();
        assert_eq!(status.job_id, Some(newer));
        assert_eq!(status.state, Some(ReportState::Pending));
        assert_eq!(status.report_progress, Some(0.0));
    }

    #[test]
    fn empty_discussion_completes_with_empty_report() {
        let store = Recording::new();
        let d = seed(&store.db, Some(DiscussionTemplate::FeaturePrioritization), &[]);
        let client = echo_client(Category::BinaryProposal);
        let job = start(&store, d.id);

        assert_eq!(run_report_job(&store, &client, &job), JobOutcome::Completed);
        assert_eq!(client.call_count(), 0);
        let report = store.status(&d.id).unwrap().unwrap().report.unwrap();
        assert_eq!(report["theme_board"], json!([]));
    }
}
