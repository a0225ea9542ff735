use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use uom_model::ids::JobId;
use uom_model::job::{Job, JobStatus};

use crate::events::{JobEvent, JobEventChannel, JobEventKind};

/// One row of the job table: the job itself, its event channel, and the
/// sequence counter driving [`JobEvent::sequence`].
pub struct JobEntry {
    pub id: JobId,
    pub job: RwLock<Job>,
    pub events: JobEventChannel,
    sequence: AtomicU64,
}

impl JobEntry {
    fn new(job: Job) -> Self {
        Self {
            id: job.id,
            job: RwLock::new(job),
            events: JobEventChannel::new(256),
            sequence: AtomicU64::new(0),
        }
    }

    /// Publishes an event for this job, stamping it with the next sequence
    /// number. `status`/`progress` are passed explicitly by the caller,
    /// which already holds the `Job` lock it read them from.
    pub fn publish(&self, kind: JobEventKind, status: JobStatus, progress: u8, message: impl Into<String>) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.events
            .publish(JobEvent::new(self.id, sequence, kind, status, progress, message));
    }
}

/// In-process job table. Fine-grained per-job
/// locking: each job's record has its own `RwLock`, so one slow reader never
/// blocks writes or reads on other jobs.
#[derive(Default)]
pub struct JobTable {
    rows: DashMap<JobId, Arc<JobEntry>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) -> Arc<JobEntry> {
        let id = job.id;
        let entry = Arc::new(JobEntry::new(job));
        self.rows.insert(id, entry.clone());
        entry
    }

    pub fn get(&self, id: JobId) -> Option<Arc<JobEntry>> {
        self.rows.get(&id).map(|entry| entry.clone())
    }

    pub fn remove(&self, id: JobId) -> Option<Arc<JobEntry>> {
        self.rows.remove(&id).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub async fn snapshot_statuses(&self) -> Vec<(JobId, JobStatus)> {
        let mut out = Vec::with_capacity(self.rows.len());
        for entry in self.rows.iter() {
            let status = entry.value().job.read().await.status;
            out.push((*entry.key(), status));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uom_model::file_context::{FileContext, FileLocator, OrgSecurityPolicy, UserContext};

    fn sample_job() -> Job {
        let file = FileContext::new(
            "report.pdf",
            "application/pdf",
            10,
            FileLocator::StoragePath("/tmp/x".into()),
        )
        .unwrap();
        Job::new(file, UserContext::anonymous(), OrgSecurityPolicy::default())
    }

    #[tokio::test]
    async fn insert_and_get_round_trips() {
        let table = JobTable::new();
        let job = sample_job();
        let id = job.id;
        table.insert(job);
        assert!(table.get(id).is_some());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn remove_drops_the_row() {
        let table = JobTable::new();
        let job = sample_job();
        let id = job.id;
        table.insert(job);
        assert!(table.remove(id).is_some());
        assert!(table.get(id).is_none());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn published_events_carry_increasing_sequence_numbers() {
        let table = JobTable::new();
        let job = sample_job();
        let entry = table.insert(job);
        let mut receiver = entry.events.subscribe();
        entry.publish(JobEventKind::Stage, JobStatus::Triaging, 10, "triage started");
        entry.publish(JobEventKind::Stage, JobStatus::SandboxRunning, 25, "sandbox started");
        let first = receiver.recv().await.unwrap();
        let second = receiver.recv().await.unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
    }
}
