use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use uom_config::UomConfig;
use uom_contracts::error::Result as ContractResult;
use uom_contracts::external_client::{
    AnalyzeOutcome, PendingAnalyze, PollPolicy, RemoteJobStatus, RequestMeta, ScanProtocolClient, ScanStatusReport,
    ScanSubmission, SyncAnalyzeClient,
};
use uom_core::decision_engine::LlmDecisionEngine;
use uom_core::dispatch_gate::GateServices;
use uom_core::orchestrator::{Orchestrator, OrchestratorServices, OrchestratorTimeouts};

use crate::infra::app_state::AppState;

/// A sandbox client that completes immediately with no result, which
/// `run_sandbox` turns into a synthetic medium-threat finding -- enough to
/// drive a job all the way through the pipeline without a real CyberAgent.
struct StubSandboxClient;

#[async_trait]
impl ScanProtocolClient for StubSandboxClient {
    fn service_name(&self) -> &str {
        "stub-sandbox"
    }

    async fn submit(&self, _meta: &RequestMeta, _payload: serde_json::Value) -> ContractResult<ScanSubmission> {
        Ok(ScanSubmission {
            remote_job_id: "stub-job".into(),
            status: RemoteJobStatus::Completed,
        })
    }

    async fn status(&self, _meta: &RequestMeta, _remote_job_id: &str) -> ContractResult<ScanStatusReport> {
        Ok(ScanStatusReport {
            status: RemoteJobStatus::Completed,
            progress: Some(100),
            result: None,
            error: None,
        })
    }

    async fn cancel(&self, _meta: &RequestMeta, _remote_job_id: &str) -> ContractResult<bool> {
        Ok(true)
    }
}

/// Builds an `AppState` with a real `Orchestrator` wired to stub/absent
/// downstream clients, so handler tests exercise the full pipeline without
/// any network calls.
pub fn build_test_state() -> AppState {
    build_test_state_with_primary(None)
}

/// A scripted `SyncAnalyzeClient` that answers one decision point with a
/// canned response and errors on every other -- the other stages then fall
/// through to their own fixed heuristics, which is fine for a test that only
/// cares about one stage's behavior.
struct ScriptedAnalyze {
    decision_point: &'static str,
    response: serde_json::Value,
}

#[async_trait]
impl SyncAnalyzeClient for ScriptedAnalyze {
    fn service_name(&self) -> &str {
        "scripted"
    }

    async fn analyze(&self, _meta: &RequestMeta, payload: serde_json::Value) -> ContractResult<AnalyzeOutcome> {
        if payload.get("decision_point").and_then(|v| v.as_str()) == Some(self.decision_point) {
            Ok(AnalyzeOutcome { result: Some(self.response.clone()), pending: None })
        } else {
            Err(uom_contracts::error::ContractError::Fatal {
                service: "scripted".into(),
                message: "no scripted response for this decision point".into(),
            })
        }
    }

    async fn poll(&self, _meta: &RequestMeta, _pending: &PendingAnalyze) -> ContractResult<AnalyzeOutcome> {
        unreachable!("scripted client never returns pending")
    }
}

/// Builds an `AppState` whose decision engine answers `security_assessment`
/// with `response` and falls back to the fixed heuristics for every other
/// stage.
pub fn build_test_state_with_security_response(response: serde_json::Value) -> AppState {
    let primary: Arc<dyn SyncAnalyzeClient> =
        Arc::new(ScriptedAnalyze { decision_point: "security_assessment", response });
    build_test_state_with_primary(Some(primary))
}

fn build_test_state_with_primary(primary: Option<Arc<dyn SyncAnalyzeClient>>) -> AppState {
    let services = OrchestratorServices {
        decision_engine: Arc::new(LlmDecisionEngine::new(primary, None, None)),
        sandbox_client: Arc::new(StubSandboxClient),
        sandbox_poll_policy: PollPolicy::new(Duration::from_millis(5), Duration::from_secs(5)),
        scan_targets: HashMap::new(),
        sync_targets: HashMap::new(),
        pattern_cache: None,
        pattern_executor: None,
        storage_sinks: HashMap::new(),
    };
    let timeouts = OrchestratorTimeouts {
        job_timeout: Duration::from_secs(5),
        sandbox_timeout: Duration::from_secs(5),
        janitor_interval: Duration::from_secs(60),
    };
    let orchestrator = Arc::new(Orchestrator::new(services, timeouts, 10));
    AppState {
        orchestrator,
        config: Arc::new(UomConfig::default()),
        gate_services: GateServices::default(),
    }
}
