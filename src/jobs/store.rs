//! Concurrent store of job records.
//!
//! Every status change goes through [`JobStore::transition`], which rejects
//! moves the state machine does not allow.

use std::path::PathBuf;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::job::{unix_now, JobId, JobStatus, OperationKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Snapshot of a job as exposed by the status endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: JobId,
    pub request_id: Uuid,
    pub kind: OperationKind,
    pub status: JobStatus,
    pub attempts: u32,
    pub created_at: f64,
    pub started_at: Option<f64>,
    pub completed_at: Option<f64>,
    pub output_path: Option<PathBuf>,
    pub output_url: Option<String>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(id: JobId, request_id: Uuid, kind: OperationKind) -> Self {
        Self {
            id,
            request_id,
            kind,
            status: JobStatus::Queued,
            attempts: 0,
            created_at: unix_now(),
            started_at: None,
            completed_at: None,
            output_path: None,
            output_url: None,
            error: None,
        }
    }
}

struct StoreEntry {
    record: JobRecord,
    cancel: CancellationToken,
}

/// Number of jobs in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Thread-safe job table keyed by job id.
pub struct JobStore {
    entries: DashMap<JobId, StoreEntry>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert a freshly accepted job.
    pub fn insert(&self, record: JobRecord, cancel: CancellationToken) {
        self.entries.insert(record.id, StoreEntry { record, cancel });
    }

    /// Forget a job that was never admitted to the queue.
    pub fn remove(&self, id: &JobId) -> Option<JobRecord> {
        self.entries.remove(id).map(|(_, e)| e.record)
    }

    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.entries.get(id).map(|e| e.record.clone())
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.entries.contains_key(id)
    }

    /// Cancellation token of a stored job.
    pub fn cancel_token(&self, id: &JobId) -> Option<CancellationToken> {
        self.entries.get(id).map(|e| e.cancel.clone())
    }

    /// Move a job to `to`, applying `update` to the record on success.
    pub fn transition<F>(&self, id: &JobId, to: JobStatus, update: F) -> Result<JobRecord, StoreError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut entry = self.entries.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        let from = entry.record.status;
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { id: *id, from, to });
        }
        entry.record.status = to;
        update(&mut entry.record);
        if to.is_terminal() {
            entry.record.completed_at = Some(unix_now());
        }
        Ok(entry.record.clone())
    }

    pub fn mark_running(&self, id: &JobId) -> Result<JobRecord, StoreError> {
        self.transition(id, JobStatus::Running, |r| {
            r.attempts += 1;
            r.started_at = Some(unix_now());
        })
    }

    pub fn mark_succeeded(
        &self,
        id: &JobId,
        output_path: PathBuf,
        output_url: String,
    ) -> Result<JobRecord, StoreError> {
        self.transition(id, JobStatus::Succeeded, |r| {
            r.output_path = Some(output_path);
            r.output_url = Some(output_url);
            r.error = None;
        })
    }

    pub fn mark_failed(&self, id: &JobId, error: impl Into<String>) -> Result<JobRecord, StoreError> {
        let error = error.into();
        self.transition(id, JobStatus::Failed, |r| r.error = Some(error))
    }

    /// Put a running job back in line after a transient failure.
    pub fn mark_requeued(&self, id: &JobId, error: impl Into<String>) -> Result<JobRecord, StoreError> {
        let error = error.into();
        self.transition(id, JobStatus::Queued, |r| r.error = Some(error))
    }

    /// Cancel a queued or running job and fire its token.
    pub fn cancel(&self, id: &JobId) -> Result<JobRecord, StoreError> {
        let record = self.transition(id, JobStatus::Cancelled, |_| {})?;
        if let Some(token) = self.cancel_token(id) {
            token.cancel();
        }
        Ok(record)
    }

    /// Drop finished jobs that completed more than `ttl` ago.
    pub fn purge_expired(&self, ttl: Duration) -> usize {
        self.purge_completed_before(unix_now() - ttl.as_secs_f64())
    }

    /// Drop finished jobs whose completion time is earlier than `cutoff`.
    pub fn purge_completed_before(&self, cutoff: f64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| {
            !(e.record.status.is_terminal()
                && e.record.completed_at.is_some_and(|done| done < cutoff))
        });
        before.saturating_sub(self.entries.len())
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in self.entries.iter() {
            match entry.record.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Succeeded => counts.succeeded += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Ids of jobs that have not reached a terminal state.
    pub fn active_ids(&self) -> Vec<JobId> {
        self.entries
            .iter()
            .filter(|e| e.record.status.is_active())
            .map(|e| *e.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(store: &JobStore) -> JobId {
        let id = JobId::new();
        store.insert(
            JobRecord::new(id, Uuid::new_v4(), OperationKind::PopulatedRedesign),
            CancellationToken::new(),
        );
        id
    }

    #[test]
    fn running_increments_attempts() {
        let store = JobStore::new();
        let id = queued(&store);
        let rec = store.mark_running(&id).unwrap();
        assert_eq!(rec.status, JobStatus::Running);
        assert_eq!(rec.attempts, 1);
        assert!(rec.started_at.is_some());
    }

    #[test]
    fn success_records_output_and_completion() {
        let store = JobStore::new();
        let id = queued(&store);
        store.mark_running(&id).unwrap();
        let rec = store
            .mark_succeeded(&id, PathBuf::from("out.png"), "http://x/out.png".into())
            .unwrap();
        assert_eq!(rec.status, JobStatus::Succeeded);
        assert_eq!(rec.output_url.as_deref(), Some("http://x/out.png"));
        assert!(rec.completed_at.is_some());
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let store = JobStore::new();
        let id = queued(&store);
        let err = store.mark_failed(&id, "boom").unwrap_err();
        assert_eq!(
            err,
            StoreError::InvalidTransition {
                id,
                from: JobStatus::Queued,
                to: JobStatus::Failed
            }
        );
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn cancel_fires_token() {
        let store = JobStore::new();
        let id = queued(&store);
        let token = store.cancel_token(&id).unwrap();
        store.cancel(&id).unwrap();
        assert!(token.is_cancelled());
        assert!(store.cancel(&id).is_err());
    }

    #[test]
    fn unknown_job_is_not_found() {
        let store = JobStore::new();
        let id = JobId::new();
        assert_eq!(store.mark_running(&id).unwrap_err(), StoreError::NotFound(id));
    }

    #[test]
    fn purge_only_drops_old_terminal_jobs() {
        let store = JobStore::new();
        let active = queued(&store);
        let done = queued(&store);
        store.mark_running(&done).unwrap();
        store.mark_failed(&done, "boom").unwrap();

        assert_eq!(store.purge_completed_before(0.0), 0);
        assert_eq!(store.purge_completed_before(unix_now() + 1.0), 1);
        assert!(store.contains(&active));
        assert!(!store.contains(&done));
    }

    #[test]
    fn counts_group_by_status() {
        let store = JobStore::new();
        let a = queued(&store);
        let _b = queued(&store);
        store.mark_running(&a).unwrap();
        let counts = store.counts();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.running, 1);
        assert_eq!(store.active_ids().len(), 2);
    }
}
