#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::decision::{PostProcessDecision, RouteDecision, SecurityDecision, TriageDecision};
use crate::file_context::{FileContext, OrgSecurityPolicy, UserContext};
use crate::ids::{CorrelationId, JobId};
use crate::sandbox::SandboxAnalysisResult;

/// Scheduler-visible job states. Matches the linear FSM in the orchestrator
/// design: non-terminal states only move forward; terminal states never
/// transition again.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JobStatus {
    Pending,
    Triaging,
    SandboxRunning,
    SecurityAssessment,
    Routing,
    Processing,
    PostProcessing,
    Completed,
    Blocked,
    ReviewQueued,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Blocked | JobStatus::ReviewQueued | JobStatus::Failed
        )
    }

    /// Progress percentage associated with entering this status, per the
    /// fixed trajectory 0,10,25,45,55,70,90,100.
    pub fn progress(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Triaging => 10,
            JobStatus::SandboxRunning => 25,
            JobStatus::SecurityAssessment => 45,
            JobStatus::Routing => 55,
            JobStatus::Processing => 70,
            JobStatus::PostProcessing => 90,
            JobStatus::Completed | JobStatus::Blocked | JobStatus::ReviewQueued | JobStatus::Failed => 100,
        }
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Triaging)
                | (Triaging, SandboxRunning)
                | (SandboxRunning, SecurityAssessment)
                | (SecurityAssessment, Blocked)
                | (SecurityAssessment, ReviewQueued)
                | (SecurityAssessment, Routing)
                | (Routing, Processing)
                | (Processing, PostProcessing)
                | (PostProcessing, Completed)
        ) || next == Failed
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StageMessage {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub stage: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl StageMessage {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            stage: stage.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Output of Stage 5 (Processing).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProcessingResult {
    pub success: bool,
    pub job_id: Option<String>,
    pub output_path: Option<String>,
    pub extracted_content: Option<String>,
    pub artifacts: Vec<String>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl ProcessingResult {
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            job_id: None,
            output_path: None,
            extracted_content: None,
            artifacts: Vec::new(),
            duration_ms,
            error: Some(error.into()),
        }
    }
}

/// The in-memory record driven by the orchestrator through its six stages.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Job {
    pub id: JobId,
    pub correlation_id: CorrelationId,

    pub file: FileContext,
    pub user: UserContext,
    pub org_policies: OrgSecurityPolicy,

    pub triage_decision: Option<TriageDecision>,
    pub sandbox_result: Option<SandboxAnalysisResult>,
    pub security_decision: Option<SecurityDecision>,
    pub route_decision: Option<RouteDecision>,
    pub processing_result: Option<ProcessingResult>,
    pub post_process_decision: Option<PostProcessDecision>,

    pub status: JobStatus,
    pub current_stage: String,
    pub stage_messages: Vec<StageMessage>,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,

    pub error: Option<String>,
    pub error_stage: Option<String>,
}

impl Job {
    pub fn new(file: FileContext, user: UserContext, org_policies: OrgSecurityPolicy) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: JobId::new(),
            correlation_id: CorrelationId::new(),
            file,
            user,
            org_policies,
            triage_decision: None,
            sandbox_result: None,
            security_decision: None,
            route_decision: None,
            processing_result: None,
            post_process_decision: None,
            status: JobStatus::Pending,
            current_stage: "pending".into(),
            stage_messages: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
            error_stage: None,
        }
    }

    pub fn progress(&self) -> u8 {
        self.status.progress()
    }

    /// Applies a forward transition, panicking in debug builds if the
    /// transition violates the FSM -- callers (the orchestrator stages) are
    /// expected to only ever request legal transitions.
    pub fn transition_to(&mut self, next: JobStatus, stage_label: impl Into<String>) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal job transition {:?} -> {:?}",
            self.status,
            next
        );
        self.status = next;
        self.current_stage = stage_label.into();
        self.updated_at = chrono::Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
    }

    pub fn fail(&mut self, stage: impl Into<String>, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_stage = Some(stage.into());
        self.error = Some(error.into());
        self.updated_at = chrono::Utc::now();
        self.completed_at = Some(self.updated_at);
    }

    pub fn log(&mut self, message: StageMessage) {
        self.stage_messages.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_context::FileLocator;

    fn sample_file() -> FileContext {
        FileContext::new(
            "report.pdf",
            "application/pdf",
            1024,
            FileLocator::StoragePath("/tmp/report.pdf".into()),
        )
        .unwrap()
    }

    #[test]
    fn progress_is_non_decreasing_along_the_happy_path() {
        let mut job = Job::new(sample_file(), UserContext::anonymous(), OrgSecurityPolicy::default());
        let mut last_progress = job.progress();
        for next in [
            JobStatus::Triaging,
            JobStatus::SandboxRunning,
            JobStatus::SecurityAssessment,
            JobStatus::Routing,
            JobStatus::Processing,
            JobStatus::PostProcessing,
            JobStatus::Completed,
        ] {
            job.transition_to(next, "stage");
            assert!(job.progress() >= last_progress);
            last_progress = job.progress();
        }
        assert_eq!(job.progress(), 100);
    }

    #[test]
    fn terminal_states_do_not_transition() {
        let mut job = Job::new(sample_file(), UserContext::anonymous(), OrgSecurityPolicy::default());
        job.transition_to(JobStatus::Triaging, "triage");
        job.transition_to(JobStatus::SandboxRunning, "sandbox");
        job.transition_to(JobStatus::SecurityAssessment, "security");
        job.transition_to(JobStatus::Blocked, "blocked");
        assert!(job.status.is_terminal());
        assert!(!job.status.can_transition_to(JobStatus::Routing));
    }

    #[test]
    fn any_non_terminal_stage_can_fail() {
        assert!(JobStatus::Triaging.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
    }
}
