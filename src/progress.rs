//! In-memory registry of indexing-job state.
//!
//! Each long-running indexing operation is tracked under a job identifier
//! so clients can poll status, percentage, and an ETA while the background
//! task runs. Jobs start under a provisional identifier when indexing must
//! begin before the document's persistent id is known, and are moved to
//! the real id with [`ProgressTracker::transfer`].
//!
//! The tracker is a lifecycle-scoped value, not a process-wide singleton:
//! clone it into whatever owns the pipeline, and every clone shares the
//! same underlying map. Records are advisory: a missing job means
//! "unknown, consult the persisted document state", never an error, and a
//! delayed sweep removes terminal records after a retention period.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Job lifecycle: `Pending → Processing → {Completed | Failed}`.
/// Terminal states never transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One indexing attempt for one document.
#[derive(Debug, Clone)]
pub struct IndexingJob {
    pub total_units: u64,
    pub processed_units: u64,
    pub status: JobStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Snapshot returned to polling clients.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub status: JobStatus,
    pub percent: u8,
    pub processed_units: u64,
    pub total_units: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Concurrent job registry. All mutations are single-key
/// read-modify-write under the map's per-entry locking, so updates for
/// different jobs never interfere.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    jobs: Arc<DashMap<String, IndexingJob>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a job in `Pending` with zero processed units.
    pub fn init(&self, job_id: &str, total_units: u64) {
        self.jobs.insert(
            job_id.to_string(),
            IndexingJob {
                total_units,
                processed_units: 0,
                status: JobStatus::Pending,
                error: None,
                started_at: Utc::now(),
                ended_at: None,
            },
        );
    }

    /// Record progress and move the job to `Processing`.
    ///
    /// No-op for unknown jobs (the record may already have been swept) and
    /// for jobs in a terminal state.
    pub fn update(&self, job_id: &str, processed_units: u64) {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            if job.status.is_terminal() {
                return;
            }
            job.processed_units = processed_units;
            job.status = JobStatus::Processing;
        }
    }

    /// Mark the job `Completed` with all units processed.
    pub fn complete(&self, job_id: &str) {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            if job.status.is_terminal() {
                return;
            }
            job.processed_units = job.total_units;
            job.status = JobStatus::Completed;
            job.ended_at = Some(Utc::now());
        }
    }

    /// Mark the job `Failed` with an error message.
    pub fn fail(&self, job_id: &str, message: &str) {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            if job.status.is_terminal() {
                return;
            }
            job.status = JobStatus::Failed;
            job.error = Some(message.to_string());
            job.ended_at = Some(Utc::now());
        }
    }

    /// Move a job's state from a provisional id to the real one, removing
    /// the provisional entry. Returns whether a job existed to transfer.
    pub fn transfer(&self, temp_id: &str, real_id: &str) -> bool {
        match self.jobs.remove(temp_id) {
            Some((_, job)) => {
                self.jobs.insert(real_id.to_string(), job);
                true
            }
            None => false,
        }
    }

    /// Remove a job record immediately.
    pub fn clear(&self, job_id: &str) {
        self.jobs.remove(job_id);
    }

    /// Progress percentage in `0..=100`; `100` for zero-unit jobs.
    pub fn percentage(&self, job_id: &str) -> Option<u8> {
        self.jobs.get(job_id).map(|job| percent_of(&job))
    }

    /// Estimated seconds remaining, defined only while the job is
    /// `Processing` with at least one unit done:
    /// `elapsed / (processed / total) - elapsed`.
    pub fn eta_seconds(&self, job_id: &str) -> Option<f64> {
        let job = self.jobs.get(job_id)?;
        eta_of(&job)
    }

    /// Full snapshot for polling clients; `None` when the job is unknown.
    pub fn progress(&self, job_id: &str) -> Option<ProgressReport> {
        let job = self.jobs.get(job_id)?;
        Some(ProgressReport {
            status: job.status,
            percent: percent_of(&job),
            processed_units: job.processed_units,
            total_units: job.total_units,
            eta_seconds: eta_of(&job),
            error: job.error.clone(),
        })
    }

    /// Schedule removal of a terminal job record after `delay`.
    ///
    /// Advisory cleanup only: the task re-checks that the job is still
    /// terminal before removing, so a record re-initialized for a retry is
    /// left alone.
    pub fn sweep_after(&self, job_id: &str, delay: Duration) {
        let jobs = Arc::clone(&self.jobs);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_terminal = jobs
                .get(&job_id)
                .map(|job| job.status.is_terminal())
                .unwrap_or(false);
            if still_terminal {
                jobs.remove(&job_id);
                tracing::debug!(job_id = %job_id, "swept job record");
            }
        });
    }
}

fn percent_of(job: &IndexingJob) -> u8 {
    if job.total_units == 0 {
        return 100;
    }
    let ratio = job.processed_units as f64 / job.total_units as f64;
    (ratio * 100.0).round().min(100.0) as u8
}

fn eta_of(job: &IndexingJob) -> Option<f64> {
    if job.status != JobStatus::Processing || job.processed_units == 0 || job.total_units == 0 {
        return None;
    }
    let elapsed = (Utc::now() - job.started_at).num_milliseconds() as f64 / 1000.0;
    let fraction = job.processed_units as f64 / job.total_units as f64;
    Some((elapsed / fraction - elapsed).max(0.0))
}
