use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::PipelineError;
use crate::pipeline::structuring::BatchOptions;

/// Cooperative cancellation flag plus overall deadline for one job.
#[derive(Debug, Clone)]
pub struct JobControl {
    cancelled: Arc<AtomicBool>,
    deadline: Instant,
}

impl JobControl {
    pub fn new(deadline_after: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now() + deadline_after,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Checked between stages.
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(PipelineError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Batch options that share this job's flag and deadline.
    pub fn batch_options(&self, concurrency: usize) -> BatchOptions {
        BatchOptions {
            concurrency,
            cancelled: Some(Arc::clone(&self.cancelled)),
            deadline: Some(self.deadline),
        }
    }
}
