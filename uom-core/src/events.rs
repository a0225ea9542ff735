use std::fmt;

use tokio::sync::broadcast;
use uom_model::ids::JobId;
use uom_model::job::JobStatus;

/// Kind discriminant used as the SSE `event:` line and as the filter key for
/// subscribers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum JobEventKind {
    Status,
    Stage,
    Blocked,
    ReviewQueued,
    Escalated,
    StorageComplete,
    Notification,
    Complete,
    Error,
}

impl JobEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobEventKind::Status => "status",
            JobEventKind::Stage => "stage",
            JobEventKind::Blocked => "blocked",
            JobEventKind::ReviewQueued => "review_queued",
            JobEventKind::Escalated => "escalated",
            JobEventKind::StorageComplete => "storage_complete",
            JobEventKind::Notification => "notification",
            JobEventKind::Complete => "complete",
            JobEventKind::Error => "error",
        }
    }

    /// The last event of a job's stream is always one of these
    /// testable property 4).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobEventKind::Complete | JobEventKind::Blocked | JobEventKind::ReviewQueued | JobEventKind::Error
        )
    }
}

impl fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event in a job's total, monotone, per-job event order.
#[derive(Clone, Debug)]
pub struct JobEvent {
    pub job_id: JobId,
    /// Monotonically increasing per job; lets SSE subscribers resume via
    /// `Last-Event-ID`.
    pub sequence: u64,
    pub kind: JobEventKind,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl JobEvent {
    pub fn new(
        job_id: JobId,
        sequence: u64,
        kind: JobEventKind,
        status: JobStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            sequence,
            kind,
            status,
            progress,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Per-job broadcast channel. One producer (the pipeline task driving the
/// job), many consumers (SSE subscribers). A subscriber that falls behind
/// the channel capacity silently misses the oldest events rather than
/// blocking the pipeline -- this is the "best-effort per sink" delivery
/// semantics.
#[derive(Debug)]
pub struct JobEventChannel {
    sender: broadcast::Sender<JobEvent>,
}

impl JobEventChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: JobEvent) {
        // No receivers is not an error: the job may run with nobody
        // watching its stream.
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
