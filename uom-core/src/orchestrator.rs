//! The orchestrator: owns the job table, drives each job through the six
//! stages, publishes events, and runs the janitor that evicts runaway jobs
//! One `tokio::spawn`ed task per job; the orchestrator itself
//! never blocks on a job's pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::{self, Duration};
use tracing::{error, info, warn};

use uom_contracts::decision_engine::{DecisionContext, DecisionEngine, RequestFingerprint};
use uom_contracts::external_client::{PollPolicy, ScanProtocolClient, StorageSinkClient, SyncAnalyzeClient};
use uom_contracts::pattern_cache::PatternCache;
use uom_model::decision::{DecisionPoint, RouteTarget, SecurityAction, StorageSink};
use uom_model::file_context::{FileContext, OrgSecurityPolicy, UserContext};
use uom_model::ids::JobId;
use uom_model::job::{Job, JobStatus, ProcessingResult, StageMessage};

use crate::decision_engine::LlmDecisionEngine;
use crate::error::{OrchestratorError, Result};
use crate::events::{JobEvent, JobEventKind};
use crate::job_table::{JobEntry, JobTable};
use crate::stages::{self, ProcessServices};

/// Everything the orchestrator needs injected to drive jobs end to end.
pub struct OrchestratorServices {
    pub decision_engine: Arc<LlmDecisionEngine>,
    pub sandbox_client: Arc<dyn ScanProtocolClient>,
    pub sandbox_poll_policy: PollPolicy,
    pub scan_targets: HashMap<RouteTarget, Arc<dyn ScanProtocolClient>>,
    pub sync_targets: HashMap<RouteTarget, Arc<dyn SyncAnalyzeClient>>,
    pub pattern_cache: Option<Arc<dyn uom_contracts::pattern_cache::PatternCache>>,
    pub pattern_executor: Option<Arc<dyn uom_contracts::pattern_cache::PatternExecutor>>,
    pub storage_sinks: HashMap<StorageSink, Arc<dyn StorageSinkClient>>,
}

/// Wall-clock budgets the job-level timeout and the janitor enforce.
#[derive(Clone, Copy, Debug)]
pub struct OrchestratorTimeouts {
    pub job_timeout: Duration,
    pub sandbox_timeout: Duration,
    pub janitor_interval: Duration,
}

impl From<&uom_config::OrchestratorConfig> for OrchestratorTimeouts {
    fn from(config: &uom_config::OrchestratorConfig) -> Self {
        Self {
            job_timeout: Duration::from_millis(config.job_timeout_ms),
            sandbox_timeout: Duration::from_millis(config.sandbox_timeout_ms),
            janitor_interval: Duration::from_secs(config.janitor_interval_secs),
        }
    }
}

/// Summary the `GET /v1/orchestrator/stats` endpoint reports.
#[derive(Debug)]
pub struct OrchestratorStats {
    pub total_jobs: usize,
    pub by_status: HashMap<&'static str, usize>,
}

pub struct Orchestrator {
    jobs: JobTable,
    services: OrchestratorServices,
    timeouts: OrchestratorTimeouts,
    max_concurrent_jobs: usize,
    semaphore: Arc<tokio::sync::Semaphore>,
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Triaging => "triaging",
        JobStatus::SandboxRunning => "sandbox_running",
        JobStatus::SecurityAssessment => "security_assessment",
        JobStatus::Routing => "routing",
        JobStatus::Processing => "processing",
        JobStatus::PostProcessing => "post_processing",
        JobStatus::Completed => "completed",
        JobStatus::Blocked => "blocked",
        JobStatus::ReviewQueued => "review_queued",
        JobStatus::Failed => "failed",
    }
}

impl Orchestrator {
    pub fn new(services: OrchestratorServices, timeouts: OrchestratorTimeouts, max_concurrent_jobs: usize) -> Self {
        Self {
            jobs: JobTable::new(),
            services,
            timeouts,
            max_concurrent_jobs,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent_jobs)),
        }
    }

    /// Starts the background janitor task. Returns its `JoinHandle` so the
    /// server can hold it and shut it down on exit.
    pub fn spawn_janitor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval(this.timeouts.janitor_interval);
            loop {
                ticker.tick().await;
                this.sweep_stale_jobs().await;
            }
        })
    }

    async fn sweep_stale_jobs(&self) {
        let eviction_after = self.timeouts.job_timeout * 2;
        let now = chrono::Utc::now();
        for (id, status) in self.jobs.snapshot_statuses().await {
            if status.is_terminal() {
                continue;
            }
            let Some(entry) = self.jobs.get(id) else { continue };
            let age = {
                let job = entry.job.read().await;
                now.signed_duration_since(job.created_at)
            };
            let Ok(age) = age.to_std() else { continue };
            if age > eviction_after {
                warn!(job_id = %id, "janitor evicting job that exceeded twice its wall-clock budget");
                let mut job = entry.job.write().await;
                job.fail("janitor", "evicted: exceeded 2x job timeout without completing");
                entry.publish(JobEventKind::Error, job.status, job.progress(), "evicted by janitor");
            }
        }
    }

    /// `Process`: submits a file for the full pipeline. Returns the new
    /// job's id immediately; the pipeline runs in a spawned task.
    pub fn submit(self: &Arc<Self>, file: FileContext, user: UserContext, org_policies: OrgSecurityPolicy) -> JobId {
        let job = Job::new(file, user, org_policies);
        let id = job.id;
        let entry = self.jobs.insert(job);
        let this = Arc::clone(self);
        tokio::spawn(async move { this.drive(entry).await });
        id
    }

    /// `GetJob`.
    pub fn get(&self, id: JobId) -> Option<Arc<JobEntry>> {
        self.jobs.get(id)
    }

    /// `Subscribe`.
    pub fn subscribe(&self, id: JobId) -> Option<broadcast::Receiver<JobEvent>> {
        self.jobs.get(id).map(|entry| entry.events.subscribe())
    }

    /// `Stats`.
    pub async fn stats(&self) -> OrchestratorStats {
        let mut by_status = HashMap::new();
        for (_, status) in self.jobs.snapshot_statuses().await {
            *by_status.entry(status_label(status)).or_insert(0) += 1;
        }
        OrchestratorStats {
            total_jobs: self.jobs.len(),
            by_status,
        }
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    async fn drive(self: Arc<Self>, entry: Arc<JobEntry>) {
        // Backpressure: block in the queue rather than silently dropping
        // the job.
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("the job semaphore is never closed");
        let outcome = time::timeout(self.timeouts.job_timeout, self.run_pipeline(&entry)).await;
        if outcome.is_err() {
            let mut job = entry.job.write().await;
            if !job.status.is_terminal() {
                let stage = job.current_stage.clone();
                job.fail(stage, "job exceeded its wall-clock budget");
                entry.publish(JobEventKind::Error, job.status, job.progress(), "job timed out");
            }
        }
    }

    async fn run_pipeline(&self, entry: &Arc<JobEntry>) -> Result<()> {
        if let Err(error) = self.run_pipeline_inner(entry).await {
            let mut job = entry.job.write().await;
            if !job.status.is_terminal() {
                let stage = job.current_stage.clone();
                error!(job_id = %entry.id, stage = %stage, %error, "job failed");
                job.fail(stage, error.to_string());
                entry.publish(JobEventKind::Error, job.status, job.progress(), error.to_string());
            }
        }
        Ok(())
    }

    async fn run_pipeline_inner(&self, entry: &Arc<JobEntry>) -> Result<()> {
        // Stage 1: triage.
        {
            let mut job = entry.job.write().await;
            job.transition_to(JobStatus::Triaging, "triage");
            entry.publish(JobEventKind::Stage, job.status, job.progress(), "triage started");
        }
        let triage = {
            let job = entry.job.read().await;
            let ctx = build_context(&job, None, None, None, None);
            stages::run_triage(&ctx, self.services.decision_engine.as_ref())
                .await
                .map_err(|e| OrchestratorError::StageFailed { stage: "triage", source: e })?
        };
        {
            let mut job = entry.job.write().await;
            job.triage_decision = Some(triage.decision.clone());
            job.log(StageMessage::new("triage", triage.reason.clone()));
        }

        // Stage 2: sandbox. Never fails the job outright.
        {
            let mut job = entry.job.write().await;
            job.transition_to(JobStatus::SandboxRunning, "sandbox");
            entry.publish(JobEventKind::Stage, job.status, job.progress(), "sandbox analysis started");
        }
        let correlation_id = entry.job.read().await.correlation_id;
        let sandbox_result = stages::run_sandbox(
            &triage.decision,
            correlation_id,
            self.services.sandbox_client.as_ref(),
            self.services.sandbox_poll_policy,
        )
        .await;
        {
            let mut job = entry.job.write().await;
            job.sandbox_result = Some(sandbox_result.clone());
            job.log(StageMessage::new("sandbox", format!("classified as {:?}", sandbox_result.classification)));
        }

        // Stage 3: security assessment.
        {
            let mut job = entry.job.write().await;
            job.transition_to(JobStatus::SecurityAssessment, "security");
            entry.publish(JobEventKind::Stage, job.status, job.progress(), "security assessment started");
        }
        let security = {
            let job = entry.job.read().await;
            let ctx = build_context(&job, job.sandbox_result.as_ref(), None, None, None);
            stages::run_security(&ctx, self.services.decision_engine.as_ref())
                .await
                .map_err(|e| OrchestratorError::StageFailed { stage: "security", source: e })?
        };
        {
            let mut job = entry.job.write().await;
            job.security_decision = Some(security.decision.clone());
        }

        match security.decision.action {
            SecurityAction::Block => {
                let mut job = entry.job.write().await;
                job.transition_to(JobStatus::Blocked, "blocked");
                entry.publish(JobEventKind::Blocked, job.status, job.progress(), security.decision.reason.clone());
                return Ok(());
            }
            SecurityAction::Escalate => {
                // Flagged for human attention, but not terminal: the pipeline
                // still proceeds to routing below.
                let job = entry.job.read().await;
                entry.publish(JobEventKind::Escalated, job.status, job.progress(), security.decision.reason.clone());
            }
            SecurityAction::Review => {
                let mut job = entry.job.write().await;
                job.transition_to(JobStatus::ReviewQueued, "review_queued");
                entry.publish(
                    JobEventKind::ReviewQueued,
                    job.status,
                    job.progress(),
                    security.decision.reason.clone(),
                );
                return Ok(());
            }
            SecurityAction::Allow => {}
        }

        // Stage 4: routing.
        {
            let mut job = entry.job.write().await;
            job.transition_to(JobStatus::Routing, "route");
            entry.publish(JobEventKind::Stage, job.status, job.progress(), "routing");
        }
        let route = {
            let job = entry.job.read().await;
            let ctx = build_context(&job, job.sandbox_result.as_ref(), job.security_decision.as_ref(), None, None);
            stages::run_route(&ctx, self.services.decision_engine.as_ref())
                .await
                .map_err(|e| OrchestratorError::StageFailed { stage: "route", source: e })?
        };
        {
            let mut job = entry.job.write().await;
            job.route_decision = Some(route.decision.clone());
        }

        // Stage 5: processing.
        {
            let mut job = entry.job.write().await;
            job.transition_to(JobStatus::Processing, "process");
            entry.publish(
                JobEventKind::Stage,
                job.status,
                job.progress(),
                format!("processing via {:?}", route.decision.target_service),
            );
        }
        let processing_result = {
            let job = entry.job.read().await;
            let ctx = build_context(&job, job.sandbox_result.as_ref(), job.security_decision.as_ref(), job.route_decision.as_ref(), None);
            let process_services = ProcessServices {
                scan_targets: self.services.scan_targets.clone(),
                sync_targets: self.services.sync_targets.clone(),
                scan_poll_policy: PollPolicy::scan_default(),
            };
            stages::run_process(&ctx, &route.decision, &job.file, &process_services).await
        };
        {
            let mut job = entry.job.write().await;
            job.processing_result = Some(processing_result.clone());
        }

        // Stage 6: post-processing.
        {
            let mut job = entry.job.write().await;
            job.transition_to(JobStatus::PostProcessing, "post_process");
            entry.publish(JobEventKind::Stage, job.status, job.progress(), "post-processing");
        }
        let post_process = {
            let job = entry.job.read().await;
            let ctx = build_context(
                &job,
                job.sandbox_result.as_ref(),
                job.security_decision.as_ref(),
                job.route_decision.as_ref(),
                job.processing_result.as_ref(),
            );
            stages::run_post_process(&ctx, self.services.decision_engine.as_ref())
                .await
                .map_err(|e| OrchestratorError::StageFailed { stage: "post_process", source: e })?
        };
        {
            let mut job = entry.job.write().await;
            job.post_process_decision = Some(post_process.decision.clone());
        }

        // Learner wiring: a successful, learn-flagged run teaches the
        // pattern cache (and the decision engine's own cache) the route that
        // worked; a failed run down-weights whatever pattern was tried.
        if post_process.decision.learn_pattern {
            let job = entry.job.read().await;
            if let Some(route_decision) = job.route_decision.clone() {
                let ctx = build_context(
                    &job,
                    job.sandbox_result.as_ref(),
                    job.security_decision.as_ref(),
                    job.route_decision.as_ref(),
                    job.processing_result.as_ref(),
                );
                let fingerprint = RequestFingerprint::compute(&ctx, DecisionPoint::ProcessingRoute);
                if processing_result.success {
                    let characteristics = job
                        .sandbox_result
                        .as_ref()
                        .map(|sandbox| vec![format!("{:?}", sandbox.classification), sandbox.detected_format.clone()])
                        .unwrap_or_default();
                    let pattern = stages::pattern_from_outcome(&ctx, &route_decision, characteristics);
                    if let Some(cache) = &self.services.pattern_cache {
                        let _ = cache.store_pattern(&fingerprint, pattern).await;
                    }
                    let decision_json = serde_json::to_value(&route_decision).unwrap_or(serde_json::Value::Null);
                    let _ = self
                        .services
                        .decision_engine
                        .store_pattern(&fingerprint, DecisionPoint::ProcessingRoute, decision_json, route.confidence)
                        .await;
                } else {
                    if let Some(cache) = &self.services.pattern_cache {
                        let _ = cache.record_failure(&fingerprint, processing_result.duration_ms).await;
                    }
                    let _ = self
                        .services
                        .decision_engine
                        .record_pattern_failure(&fingerprint, DecisionPoint::ProcessingRoute)
                        .await;
                }
            }
        }

        let correlation_id = entry.job.read().await.correlation_id;
        let storage_payload = serde_json::json!({
            "job_id": entry.id.to_string(),
            "processing_result": processing_result,
        });
        let storage_results =
            stages::run_storage(&post_process.decision, storage_payload, correlation_id, &self.services.storage_sinks).await;
        let storage_failures: Vec<String> = storage_results
            .iter()
            .filter_map(|(sink, result)| result.as_ref().err().map(|e| format!("{sink:?}: {e}")))
            .collect();
        if !storage_failures.is_empty() {
            warn!(job_id = %entry.id, failures = ?storage_failures, "partial storage failure");
            let job = entry.job.read().await;
            entry.publish(
                JobEventKind::Notification,
                job.status,
                job.progress(),
                format!("storage partially failed: {}", storage_failures.join("; ")),
            );
        } else if !storage_results.is_empty() {
            let job = entry.job.read().await;
            entry.publish(JobEventKind::StorageComplete, job.status, job.progress(), "all storage writes succeeded");
        }

        {
            let mut job = entry.job.write().await;
            job.transition_to(JobStatus::Completed, "completed");
            entry.publish(JobEventKind::Complete, job.status, job.progress(), "job completed");
        }
        info!(job_id = %entry.id, "job completed");
        Ok(())
    }
}

fn build_context<'a>(
    job: &'a Job,
    sandbox_result: Option<&'a uom_model::sandbox::SandboxAnalysisResult>,
    security_decision: Option<&'a uom_model::decision::SecurityDecision>,
    route_decision: Option<&'a uom_model::decision::RouteDecision>,
    processing_result: Option<&'a ProcessingResult>,
) -> DecisionContext<'a> {
    DecisionContext {
        correlation_id: job.correlation_id,
        file: &job.file,
        user: &job.user,
        org_policies: &job.org_policies,
        sandbox_result,
        security_decision,
        route_decision,
        processing_result,
    }
}
