use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Status a scan-protocol job can be in, as reported by `Status`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RemoteJobStatus {
    Queued,
    Processing,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RemoteJobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RemoteJobStatus::Completed | RemoteJobStatus::Failed | RemoteJobStatus::Cancelled
        )
    }
}

#[derive(Clone, Debug)]
pub struct ScanSubmission {
    pub remote_job_id: String,
    pub status: RemoteJobStatus,
}

#[derive(Clone, Debug)]
pub struct ScanStatusReport {
    pub status: RemoteJobStatus,
    pub progress: Option<u8>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Request envelope shared by every downstream call: carries the tracing
/// identity every client call must propagate.
#[derive(Clone, Debug)]
pub struct RequestMeta {
    pub correlation_id: String,
    pub internal_service_id: String,
}

/// `Submit + Status + Cancel`, implemented by CyberAgent, VideoAgent,
/// GeoAgent, and GitHubManager. The orchestrator polls `status` every 2 s up
/// to a caller-supplied timeout; on timeout it calls `cancel` best-effort
/// before failing the stage.
#[async_trait]
pub trait ScanProtocolClient: Send + Sync {
    fn service_name(&self) -> &str;

    async fn submit(&self, meta: &RequestMeta, payload: serde_json::Value) -> Result<ScanSubmission>;

    async fn status(&self, meta: &RequestMeta, remote_job_id: &str) -> Result<ScanStatusReport>;

    async fn cancel(&self, meta: &RequestMeta, remote_job_id: &str) -> Result<bool>;
}

/// Polling cadence and overall budget for a [`ScanProtocolClient`] call,
/// with sensible defaults (poll every 2s, 3-10 min overall depending on
/// service).
#[derive(Clone, Copy, Debug)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub const fn scan_default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(300))
    }

    pub const fn sync_analyze_default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}

/// Result of a synchronous analyze call. `pending` is populated when the
/// service chose to execute asynchronously despite the "synchronous"
/// contract, in which case the caller polls `pollUrl`/`taskId` at
/// [`PollPolicy::sync_analyze_default`] intervals.
#[derive(Clone, Debug)]
pub struct AnalyzeOutcome {
    pub result: Option<serde_json::Value>,
    pub pending: Option<PendingAnalyze>,
}

#[derive(Clone, Debug)]
pub struct PendingAnalyze {
    pub poll_url: Option<String>,
    pub task_id: Option<String>,
    pub estimated_duration: Option<Duration>,
}

/// Single request/response, implemented by MageAgent orchestration and
/// CyberAgent's quick-analyze entry point.
#[async_trait]
pub trait SyncAnalyzeClient: Send + Sync {
    fn service_name(&self) -> &str;

    async fn analyze(&self, meta: &RequestMeta, payload: serde_json::Value) -> Result<AnalyzeOutcome>;

    async fn poll(&self, meta: &RequestMeta, pending: &PendingAnalyze) -> Result<AnalyzeOutcome>;
}

/// An opaque post-processing destination (postgres, qdrant, graphrag).
/// Partial failure across sinks is tolerated by the orchestrator; this
/// trait only needs to report whether its own write succeeded.
#[async_trait]
pub trait StorageSinkClient: Send + Sync {
    fn sink_name(&self) -> &str;

    async fn store(&self, meta: &RequestMeta, payload: serde_json::Value) -> Result<()>;
}
