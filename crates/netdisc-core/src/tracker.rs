//! Registry of discovery jobs.
//!
//! The tracker owns every job's lifecycle state. The orchestrator records
//! device outcomes into it; callers poll and cancel through it. A job is
//! *settled* once every requested device has an outcome (or orchestration
//! failed), and a settled job's snapshot never changes again.

use crate::error::{DiscoveryError, Result};
use crate::job::{DiscoveryJob, ExecutionMode, JobId, JobState};
use crate::outcome::{DeviceOutcome, FailureKind};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct TrackedJob {
    job: DiscoveryJob,
    cancel: CancellationToken,
    settled: Arc<Notify>,
}

/// Process-wide job registry. Share it with `Arc`.
#[derive(Default)]
pub struct JobTracker {
    jobs: DashMap<JobId, TrackedJob>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new job and returns its cancellation token.
    pub fn register(&self, job: DiscoveryJob) -> CancellationToken {
        let cancel = CancellationToken::new();
        debug!(job_id = %job.job_id, devices = job.total_devices(), "job registered");
        self.jobs.insert(
            job.job_id,
            TrackedJob {
                job,
                cancel: cancel.clone(),
                settled: Arc::new(Notify::new()),
            },
        );
        cancel
    }

    /// Returns a snapshot of the job.
    pub fn get(&self, job_id: JobId) -> Result<DiscoveryJob> {
        self.jobs
            .get(&job_id)
            .map(|tracked| tracked.job.clone())
            .ok_or(DiscoveryError::JobNotFound(job_id))
    }

    /// True while the job exists and has not settled.
    pub fn is_active(&self, job_id: JobId) -> bool {
        self.jobs
            .get(&job_id)
            .is_some_and(|tracked| !tracked.job.is_settled())
    }

    /// Marks a pending job running. No-op in any other state.
    pub fn mark_running(&self, job_id: JobId) {
        if let Some(mut tracked) = self.jobs.get_mut(&job_id) {
            if tracked.job.state == JobState::Pending {
                tracked.job.state = JobState::Running;
                tracked.job.started_at = Some(Utc::now());
                info!(job_id = %job_id, "job running");
            }
        }
    }

    /// Records the outcome of one device.
    ///
    /// The first outcome for a device wins. When the last outcome lands the
    /// job settles: a pending or running job becomes `completed`, a
    /// cancelled job stays `cancelled`.
    pub fn record_outcome(&self, job_id: JobId, outcome: DeviceOutcome) {
        let Some(mut tracked) = self.jobs.get_mut(&job_id) else {
            warn!(job_id = %job_id, device = %outcome.device_id, "outcome for unknown job dropped");
            return;
        };
        let job = &mut tracked.job;

        if job.is_settled()
            || job.outcomes.contains_key(&outcome.device_id)
            || !job.requested_device_ids.contains(&outcome.device_id)
        {
            warn!(job_id = %job_id, device = %outcome.device_id, "unexpected device outcome dropped");
            return;
        }

        debug!(job_id = %job_id, device = %outcome.device_id, status = %outcome.status, "device outcome recorded");
        job.outcomes.insert(outcome.device_id.clone(), outcome);

        if job.state == JobState::Pending {
            job.state = JobState::Running;
            job.started_at = Some(Utc::now());
        }

        if job.completed_devices() == job.total_devices() {
            if job.state == JobState::Running {
                job.state = JobState::Completed;
            }
            job.finished_at = Some(Utc::now());
            info!(
                job_id = %job_id,
                state = %job.state,
                devices = job.total_devices(),
                "job settled"
            );
            tracked.settled.notify_waiters();
        }
    }

    /// Fails a job whose orchestration could not proceed and settles it.
    ///
    /// Devices without an outcome are recorded as failed(internal).
    pub fn mark_failed(&self, job_id: JobId, error: impl Into<String>) {
        if let Some(mut tracked) = self.jobs.get_mut(&job_id) {
            if tracked.job.is_settled() {
                return;
            }
            let error = error.into();
            warn!(job_id = %job_id, error = %error, "job failed");

            let job = &mut tracked.job;
            for device_id in job.pending_devices() {
                let outcome = DeviceOutcome::all_failed(
                    device_id.clone(),
                    job.requested_data_types.iter(),
                    FailureKind::Internal,
                    &error,
                );
                job.outcomes.insert(device_id, outcome);
            }
            if !job.state.is_terminal() {
                job.state = JobState::Failed;
            }
            job.error = Some(error);
            job.finished_at = Some(Utc::now());
            tracked.cancel.cancel();
            tracked.settled.notify_waiters();
        }
    }

    /// Cancels a queued job.
    ///
    /// The state becomes `cancelled` at once and workers are signalled to
    /// stop issuing commands; the job settles once in-flight devices finish.
    pub fn cancel(&self, job_id: JobId) -> Result<DiscoveryJob> {
        let mut tracked = self
            .jobs
            .get_mut(&job_id)
            .ok_or(DiscoveryError::JobNotFound(job_id))?;

        let state = tracked.job.state;
        if state.is_terminal() {
            return Err(DiscoveryError::AlreadyTerminal { job_id, state });
        }
        if tracked.job.mode == ExecutionMode::Blocking {
            return Err(DiscoveryError::NotCancellable(job_id));
        }

        tracked.job.state = JobState::Cancelled;
        tracked.cancel.cancel();
        info!(
            job_id = %job_id,
            completed = tracked.job.completed_devices(),
            total = tracked.job.total_devices(),
            "job cancelled"
        );
        Ok(tracked.job.clone())
    }

    /// Waits until the job settles and returns its final snapshot.
    pub async fn wait_settled(&self, job_id: JobId) -> Result<DiscoveryJob> {
        loop {
            let settled = {
                let tracked = self
                    .jobs
                    .get(&job_id)
                    .ok_or(DiscoveryError::JobNotFound(job_id))?;
                Arc::clone(&tracked.settled)
            };
            let notified = settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let job = self.get(job_id)?;
            if job.is_settled() {
                return Ok(job);
            }
            notified.await;
        }
    }

    /// Removes settled jobs that finished at or before `cutoff`. Returns the number removed.
    pub fn prune_finished(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.jobs.retain(|_, tracked| match tracked.job.finished_at {
            Some(finished_at) if finished_at <= cutoff => {
                removed += 1;
                false
            }
            _ => true,
        });
        if removed > 0 {
            debug!(removed, "pruned finished jobs");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("jobs", &self.jobs.len())
            .finish()
    }
}
