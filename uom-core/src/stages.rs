//! The six pipeline stages, each a free function over the
//! services the orchestrator injects. Stage functions never touch `Job`
//! directly -- the orchestrator reads/writes the job record and is the only
//! place that owns the state machine and event emission.

use std::collections::HashMap;
use std::sync::Arc;

use uom_contracts::decision_engine::{DecisionContext, DecisionEngine};
use uom_contracts::error::Result;
use uom_contracts::external_client::{PollPolicy, RequestMeta, ScanProtocolClient, SyncAnalyzeClient};
use uom_contracts::external_client::StorageSinkClient;
use uom_model::decision::{
    PostProcessDecision, RouteDecision, RouteTarget, SecurityDecision, StorageSink, TriageDecision, UOMDecision,
};
use uom_model::file_context::FileContext;
use uom_model::ids::CorrelationId;
use uom_model::pattern::ProcessingPattern;
use uom_model::sandbox::SandboxAnalysisResult;

/// Stage 1: triage. Decides sandbox tier, priority, timeout, and tool list.
pub async fn run_triage(
    ctx: &DecisionContext<'_>,
    engine: &dyn DecisionEngine,
) -> Result<UOMDecision<TriageDecision>> {
    engine.decide_initial_triage(ctx).await
}

/// Stage 2: sandbox analysis. Runs the file through the submit/poll/cancel
/// scan protocol at the triage-decided tier and timeout. A sandbox failure
/// (timeout, transport error, breaker open) must not fail the job -- the
/// pipeline proceeds with a synthetic, medium-threat result instead
/// scenario: "sandbox service down").
pub async fn run_sandbox(
    triage: &TriageDecision,
    correlation_id: CorrelationId,
    sandbox_client: &dyn ScanProtocolClient,
    poll_policy: PollPolicy,
) -> SandboxAnalysisResult {
    let meta = RequestMeta {
        correlation_id: correlation_id.to_string(),
        internal_service_id: "uom-orchestrator".into(),
    };
    let payload = serde_json::json!({
        "tier": format!("{:?}", triage.sandbox_tier),
        "tools": triage.tools,
        "timeout_ms": triage.timeout_ms,
    });

    let attempt = async {
        let submission = sandbox_client.submit(&meta, payload).await?;
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(triage.timeout_ms);
        loop {
            let status = sandbox_client.status(&meta, &submission.remote_job_id).await?;
            if status.status.is_terminal() {
                let result = status
                    .result
                    .and_then(|value| serde_json::from_value::<SandboxAnalysisResult>(value).ok());
                return Ok::<_, uom_contracts::error::ContractError>(result);
            }
            if tokio::time::Instant::now() >= deadline {
                let _ = sandbox_client.cancel(&meta, &submission.remote_job_id).await;
                return Err(uom_contracts::error::ContractError::Timeout {
                    service: sandbox_client.service_name().into(),
                });
            }
            tokio::time::sleep(poll_policy.interval).await;
        }
    };

    match tokio::time::timeout(poll_policy.timeout, attempt).await {
        Ok(Ok(Some(result))) => result,
        Ok(Ok(None)) | Ok(Err(_)) | Err(_) => {
            SandboxAnalysisResult::synthetic_failure(triage.sandbox_tier, triage.timeout_ms, correlation_id.to_string())
        }
    }
}

/// Stage 3: security assessment. The orchestrator interprets
/// `decision.action` and performs the block/review/escalate/allow branch.
pub async fn run_security(
    ctx: &DecisionContext<'_>,
    engine: &dyn DecisionEngine,
) -> Result<UOMDecision<SecurityDecision>> {
    engine.decide_security_assessment(ctx).await
}

/// Stage 4: processing route.
pub async fn run_route(ctx: &DecisionContext<'_>, engine: &dyn DecisionEngine) -> Result<UOMDecision<RouteDecision>> {
    engine.decide_processing_route(ctx).await
}

/// Services a route target can be dispatched against. CyberAgent,
/// VideoAgent, GeoAgent, and GitHubManager speak the scan protocol;
/// MageAgent and FileProcess are single-shot synchronous calls.
pub struct ProcessServices {
    pub scan_targets: HashMap<RouteTarget, Arc<dyn ScanProtocolClient>>,
    pub sync_targets: HashMap<RouteTarget, Arc<dyn SyncAnalyzeClient>>,
    pub scan_poll_policy: PollPolicy,
}

/// Stage 5: processing. The pattern-cache short-circuit lives at the
/// dispatch gate, ahead of the orchestrator entirely -- by the time a job
/// reaches this stage it has already been routed, so Stage 5 always
/// dispatches to the route's target service.
pub async fn run_process(
    ctx: &DecisionContext<'_>,
    route: &RouteDecision,
    file: &FileContext,
    services: &ProcessServices,
) -> uom_model::job::ProcessingResult {
    dispatch_route(route, file, ctx.correlation_id.to_string(), services).await
}

async fn dispatch_route(
    route: &RouteDecision,
    file: &FileContext,
    correlation_id: String,
    services: &ProcessServices,
) -> uom_model::job::ProcessingResult {
    use uom_model::job::ProcessingResult;

    let meta = RequestMeta {
        correlation_id,
        internal_service_id: "uom-orchestrator".into(),
    };
    let payload = serde_json::json!({
        "method": route.method,
        "file": file,
        "config": route.config,
    });
    let started = tokio::time::Instant::now();

    if let Some(client) = services.scan_targets.get(&route.target_service) {
        let outcome = run_scan_to_completion(client.as_ref(), &meta, payload, services.scan_poll_policy).await;
        return match outcome {
            Ok(value) => ProcessingResult {
                success: true,
                job_id: None,
                output_path: None,
                extracted_content: Some(value.to_string()),
                artifacts: Vec::new(),
                duration_ms: started.elapsed().as_millis() as u64,
                error: None,
            },
            Err(error) => ProcessingResult::failure(error.to_string(), started.elapsed().as_millis() as u64),
        };
    }

    if let Some(client) = services.sync_targets.get(&route.target_service) {
        return match client.analyze(&meta, payload).await {
            Ok(outcome) => ProcessingResult {
                success: true,
                job_id: None,
                output_path: None,
                extracted_content: outcome.result.map(|v| v.to_string()),
                artifacts: Vec::new(),
                duration_ms: started.elapsed().as_millis() as u64,
                error: None,
            },
            Err(error) => ProcessingResult::failure(error.to_string(), started.elapsed().as_millis() as u64),
        };
    }

    ProcessingResult::failure(
        format!("no client configured for route target {:?}", route.target_service),
        started.elapsed().as_millis() as u64,
    )
}

async fn run_scan_to_completion(
    client: &dyn ScanProtocolClient,
    meta: &RequestMeta,
    payload: serde_json::Value,
    poll_policy: PollPolicy,
) -> uom_contracts::error::Result<serde_json::Value> {
    let submission = client.submit(meta, payload).await?;
    let deadline = tokio::time::Instant::now() + poll_policy.timeout;
    loop {
        let status = client.status(meta, &submission.remote_job_id).await?;
        if status.status.is_terminal() {
            return status.result.ok_or_else(|| uom_contracts::error::ContractError::Decode {
                service: client.service_name().into(),
                message: "terminal status carried no result".into(),
            });
        }
        if tokio::time::Instant::now() >= deadline {
            let _ = client.cancel(meta, &submission.remote_job_id).await;
            return Err(uom_contracts::error::ContractError::Timeout {
                service: client.service_name().into(),
            });
        }
        tokio::time::sleep(poll_policy.interval).await;
    }
}

/// Stage 6: post-processing decision (what to store, whether to learn).
pub async fn run_post_process(
    ctx: &DecisionContext<'_>,
    engine: &dyn DecisionEngine,
) -> Result<UOMDecision<PostProcessDecision>> {
    engine.decide_post_processing(ctx).await
}

/// Writes to every configured sink in `store_order()`, sequentially. A
/// failing sink does not stop the rest -- callers surface the
/// partial-failure list to the caller (`storage_partial`).
pub async fn run_storage(
    decision: &PostProcessDecision,
    payload: serde_json::Value,
    correlation_id: CorrelationId,
    sinks: &HashMap<StorageSink, Arc<dyn StorageSinkClient>>,
) -> Vec<(StorageSink, uom_contracts::error::Result<()>)> {
    let meta = RequestMeta {
        correlation_id: correlation_id.to_string(),
        internal_service_id: "uom-orchestrator".into(),
    };
    let mut results = Vec::new();
    for sink in decision.store_order() {
        let outcome = match sinks.get(&sink) {
            Some(client) => client.store(&meta, payload.clone()).await,
            None => Err(uom_contracts::error::ContractError::Fatal {
                service: format!("{sink:?}"),
                message: "no storage sink client configured".into(),
            }),
        };
        results.push((sink, outcome));
    }
    results
}

/// Learns a new pattern from a successful processing outcome
/// `learn_pattern`). Only called when `PostProcessDecision::learn_pattern`
/// is set; the caller supplies whatever processing code/language the route
/// target reported (falling back to the generic Python/MageAgent shape when
/// the target didn't surface anything pattern-able).
pub fn pattern_from_outcome(
    ctx: &DecisionContext<'_>,
    route: &RouteDecision,
    characteristics: Vec<String>,
) -> ProcessingPattern {
    ProcessingPattern::new(
        ctx.file.mime_type.clone(),
        characteristics,
        uom_model::pattern::PatternLanguage::Python,
        format!("route:{:?}:{}", route.target_service, route.method),
        Vec::new(),
    )
}
