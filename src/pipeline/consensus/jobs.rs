//! Registry of live report jobs, one per discussion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use uuid::Uuid;

use super::control::JobControl;
use super::orchestrator::{run_report_job, JobOutcome, ReportJob};
use super::store::ReportStore;
use crate::pipeline::structuring::StructuredClient;

#[derive(Debug, Clone)]
struct RunningJob {
    job_id: Uuid,
    control: JobControl,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    running: Mutex<HashMap<Uuid, RunningJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, RunningJob>> {
        // The map stays consistent across a panicking holder.
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `job_id` as the live job for `discussion_id`. A job it replaces
    /// is cancelled; its guarded writes would fail anyway.
    fn register(&self, discussion_id: Uuid, job_id: Uuid, control: JobControl) {
        let previous = self.lock().insert(discussion_id, RunningJob { job_id, control });
        if let Some(previous) = previous {
            tracing::info!(
                discussion_id = %discussion_id,
                job_id = %previous.job_id,
                "Cancelling superseded report job"
            );
            previous.control.cancel();
        }
    }

    /// Drop the entry only if it still belongs to `job_id`.
    fn finish(&self, discussion_id: &Uuid, job_id: &Uuid) {
        let mut running = self.lock();
        if running.get(discussion_id).is_some_and(|job| job.job_id == *job_id) {
            running.remove(discussion_id);
        }
    }

    /// Signal the live job for `discussion_id`. Returns its id.
    pub fn cancel(&self, discussion_id: &Uuid) -> Option<Uuid> {
        let running = self.lock();
        let job = running.get(discussion_id)?;
        job.control.cancel();
        Some(job.job_id)
    }

    /// Signal every live job. Used on shutdown.
    pub fn cancel_all(&self) -> usize {
        let running = self.lock();
        for job in running.values() {
            job.control.cancel();
        }
        running.len()
    }

    pub fn running_job(&self, discussion_id: &Uuid) -> Option<Uuid> {
        self.lock().get(discussion_id).map(|job| job.job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `job` on a named thread. The registry entry is removed when the
    /// job reaches any outcome.
    pub fn spawn(
        self: &Arc<Self>,
        store: Arc<dyn ReportStore>,
        client: Arc<dyn StructuredClient>,
        job: ReportJob,
    ) -> std::io::Result<JoinHandle<JobOutcome>> {
        let discussion_id = job.discussion_id;
        let job_id = job.job_id;
        self.register(discussion_id, job_id, job.control.clone());

        let registry = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(format!("concord-report-{discussion_id}"))
            .spawn(move || {
                let outcome = run_report_job(store.as_ref(), client.as_ref(), &job);
                registry.finish(&job.discussion_id, &job.job_id);
                outcome
            });
        if spawned.is_err() {
            self.finish(&discussion_id, &job_id);
        }
        spawned
    }
}
