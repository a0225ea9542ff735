use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::warn;

use async_trait::async_trait;
use uom_contracts::decision_engine::{DecisionContext, DecisionEngine, RequestFingerprint};
use uom_contracts::error::{ContractError, Result};
use uom_contracts::external_client::{PendingAnalyze, PollPolicy, RequestMeta, SyncAnalyzeClient};
use uom_contracts::fallback;
use uom_contracts::pattern_cache::{PatternCache, DEFAULT_MIN_SUCCESS_RATE};
use uom_model::decision::{
    DecisionPoint, DecisionSource, PostProcessDecision, RouteDecision, SecurityDecision, TriageDecision,
    UOMDecision,
};
use uom_model::ids::PatternId;
use uom_model::pattern::{PatternLanguage, ProcessingPattern};

/// Confidence assigned when a decision comes back from the primary backend
/// without the backend reporting its own confidence figure.
const PRIMARY_CONFIDENCE: f32 = 0.85;
/// Confidence assigned to a decision from the secondary (fallback) backend.
const SECONDARY_CONFIDENCE: f32 = 0.75;
/// Confidence assigned to a fast-path heuristic match -- higher than the
/// fixed-confidence fallback, since a fast path only fires for
/// deterministic, trivially-safe cases.
const FAST_PATH_CONFIDENCE: f32 = 0.9;

/// Only decisions an LLM actually reasoned about are worth recording an
/// outcome for -- a pattern-cache hit or fast-path match already came from a
/// previously-learned or deterministic source.
fn learns_from_outcome(source: DecisionSource) -> bool {
    matches!(source, DecisionSource::LlmPrimary | DecisionSource::LlmFallback)
}

/// Decision engine backed by a synchronous orchestration call (MageAgent is
/// treated as the black-box LLM backend), with an optional second backend tried
/// when the primary errors or times out, and the fixed heuristics in
/// [`uom_contracts::fallback`] when neither backend is configured or both
/// fail. This satisfies the contract's requirement that the orchestrator
/// behave correctly with no LLM wired at all.
pub struct LlmDecisionEngine {
    primary: Option<Arc<dyn SyncAnalyzeClient>>,
    secondary: Option<Arc<dyn SyncAnalyzeClient>>,
    patterns: Option<Arc<dyn PatternCache>>,
    poll_policy: PollPolicy,
}

impl LlmDecisionEngine {
    pub fn new(
        primary: Option<Arc<dyn SyncAnalyzeClient>>,
        secondary: Option<Arc<dyn SyncAnalyzeClient>>,
        patterns: Option<Arc<dyn PatternCache>>,
    ) -> Self {
        Self {
            primary,
            secondary,
            patterns,
            poll_policy: PollPolicy::sync_analyze_default(),
        }
    }

    fn meta(&self, ctx: &DecisionContext<'_>) -> RequestMeta {
        RequestMeta {
            correlation_id: ctx.correlation_id.to_string(),
            internal_service_id: "uom-orchestrator".into(),
        }
    }

    async fn call_one<T: DeserializeOwned>(
        &self,
        client: &dyn SyncAnalyzeClient,
        meta: &RequestMeta,
        payload: serde_json::Value,
    ) -> Result<T> {
        let mut outcome = tokio::time::timeout(self.poll_policy.timeout, client.analyze(meta, payload))
            .await
            .map_err(|_| ContractError::Timeout {
                service: client.service_name().into(),
            })??;

        let mut pending: Option<PendingAnalyze> = outcome.pending.take();
        while let Some(handle) = pending {
            tokio::time::sleep(self.poll_policy.interval).await;
            outcome = tokio::time::timeout(self.poll_policy.timeout, client.poll(meta, &handle))
                .await
                .map_err(|_| ContractError::Timeout {
                    service: client.service_name().into(),
                })??;
            pending = outcome.pending.take();
        }

        let value = outcome.result.ok_or_else(|| ContractError::Decode {
            service: client.service_name().into(),
            message: "analyze call returned neither a result nor a pending handle".into(),
        })?;
        serde_json::from_value(value).map_err(|e| ContractError::Decode {
            service: client.service_name().into(),
            message: e.to_string(),
        })
    }

    /// Resolution order: pattern cache, then fast path, then primary LLM,
    /// then secondary LLM. Each step returns the first decision it produces
    /// along with the confidence/source pair that depends on which step
    /// answered.
    async fn resolve<T: DeserializeOwned>(
        &self,
        ctx: &DecisionContext<'_>,
        point: DecisionPoint,
        payload: serde_json::Value,
        fast_path: Option<T>,
    ) -> Option<(T, f32, DecisionSource)> {
        if let Some(patterns) = &self.patterns {
            let fingerprint = RequestFingerprint::compute(ctx, point);
            if let Ok(Some(found)) = patterns.find_pattern(&fingerprint, DEFAULT_MIN_SUCCESS_RATE).await {
                if let Ok(decision) = serde_json::from_str::<T>(&found.pattern.processing_code) {
                    return Some((decision, found.confidence, DecisionSource::PatternCache));
                }
            }
        }
        if let Some(decision) = fast_path {
            return Some((decision, FAST_PATH_CONFIDENCE, DecisionSource::FastPath));
        }
        let meta = self.meta(ctx);
        if let Some(primary) = &self.primary {
            match self.call_one(primary.as_ref(), &meta, payload.clone()).await {
                Ok(value) => return Some((value, PRIMARY_CONFIDENCE, DecisionSource::LlmPrimary)),
                Err(error) => {
                    warn!(point = ?point, %error, "primary decision backend failed, trying fallback");
                }
            }
        }
        if let Some(secondary) = &self.secondary {
            match self.call_one(secondary.as_ref(), &meta, payload).await {
                Ok(value) => return Some((value, SECONDARY_CONFIDENCE, DecisionSource::LlmFallback)),
                Err(error) => {
                    warn!(point = ?point, %error, "fallback decision backend also failed");
                }
            }
        }
        None
    }
}

#[async_trait]
impl DecisionEngine for LlmDecisionEngine {
    async fn decide_initial_triage(&self, ctx: &DecisionContext<'_>) -> Result<UOMDecision<TriageDecision>> {
        let payload = serde_json::json!({
            "decision_point": "initial_triage",
            "file": ctx.file,
            "user": ctx.user,
        });
        let fast_path = fallback::fast_path_triage(ctx.file);
        if let Some((decision, confidence, source)) = self
            .resolve::<TriageDecision>(ctx, DecisionPoint::InitialTriage, payload, fast_path)
            .await
        {
            return Ok(UOMDecision {
                decision_point: DecisionPoint::InitialTriage,
                decision,
                confidence,
                reason: format!("{:?} decision", source),
                duration_ms: 0,
                source,
                learn_from_outcome: learns_from_outcome(source),
                alternatives: Vec::new(),
            });
        }
        Ok(fallback::triage_fallback(ctx.file))
    }

    async fn decide_security_assessment(
        &self,
        ctx: &DecisionContext<'_>,
    ) -> Result<UOMDecision<SecurityDecision>> {
        let Some(sandbox) = ctx.sandbox_result else {
            return Err(ContractError::ValidationFailed(
                "security assessment requires a sandbox result".into(),
            ));
        };
        let payload = serde_json::json!({
            "decision_point": "security_assessment",
            "sandbox_result": sandbox,
            "org_policies": ctx.org_policies,
        });
        let fast_path = fallback::fast_path_security(sandbox);
        if let Some((decision, confidence, source)) = self
            .resolve::<SecurityDecision>(ctx, DecisionPoint::SecurityAssessment, payload, fast_path)
            .await
        {
            return Ok(UOMDecision {
                decision_point: DecisionPoint::SecurityAssessment,
                decision,
                confidence,
                reason: format!("{:?} decision", source),
                duration_ms: 0,
                source,
                learn_from_outcome: learns_from_outcome(source),
                alternatives: Vec::new(),
            });
        }
        Ok(fallback::security_fallback(sandbox))
    }

    async fn decide_processing_route(&self, ctx: &DecisionContext<'_>) -> Result<UOMDecision<RouteDecision>> {
        let Some(sandbox) = ctx.sandbox_result else {
            return Err(ContractError::ValidationFailed(
                "processing route requires a sandbox result".into(),
            ));
        };
        let payload = serde_json::json!({
            "decision_point": "processing_route",
            "sandbox_result": sandbox,
            "file": ctx.file,
        });
        let fast_path = fallback::fast_path_route(sandbox, false);
        if let Some((decision, confidence, source)) = self
            .resolve::<RouteDecision>(ctx, DecisionPoint::ProcessingRoute, payload, fast_path)
            .await
        {
            return Ok(UOMDecision {
                decision_point: DecisionPoint::ProcessingRoute,
                decision,
                confidence,
                reason: format!("{:?} decision", source),
                duration_ms: 0,
                source,
                learn_from_outcome: learns_from_outcome(source),
                alternatives: Vec::new(),
            });
        }
        Ok(fallback::route_fallback(&sandbox.classification, sandbox, false))
    }

    async fn decide_post_processing(&self, ctx: &DecisionContext<'_>) -> Result<UOMDecision<PostProcessDecision>> {
        let success = ctx.processing_result.map(|r| r.success).unwrap_or(false);
        let payload = serde_json::json!({
            "decision_point": "post_processing",
            "processing_result": ctx.processing_result,
        });
        let fast_path = fallback::fast_path_post_process(success);
        if let Some((decision, confidence, source)) = self
            .resolve::<PostProcessDecision>(ctx, DecisionPoint::PostProcessing, payload, fast_path)
            .await
        {
            return Ok(UOMDecision {
                decision_point: DecisionPoint::PostProcessing,
                decision,
                confidence,
                reason: format!("{:?} decision", source),
                duration_ms: 0,
                source,
                learn_from_outcome: learns_from_outcome(source),
                alternatives: Vec::new(),
            });
        }
        Ok(fallback::post_process_fallback(success))
    }

    async fn store_pattern(
        &self,
        fingerprint: &RequestFingerprint,
        point: DecisionPoint,
        decision_json: serde_json::Value,
        initial_confidence: f32,
    ) -> Result<PatternId> {
        let Some(patterns) = &self.patterns else {
            return Ok(PatternId::new());
        };
        // `fingerprint.0` is `mimeType:extBucket:sizeBucket:point`; the mime
        // type is the only piece a learned decision pattern can sensibly key
        // on until the pattern cache grows a dedicated decision-pattern shape.
        let mime_type = fingerprint.0.split(':').next().unwrap_or("application/octet-stream");
        let mut pattern = ProcessingPattern::new(
            mime_type,
            vec![format!("{:?}", point)],
            PatternLanguage::Python,
            decision_json.to_string(),
            Vec::new(),
        );
        pattern.success_count = (initial_confidence * 10.0).round().max(1.0) as u64;
        patterns.store_pattern(fingerprint, pattern).await
    }

    async fn record_pattern_failure(&self, fingerprint: &RequestFingerprint, _point: DecisionPoint) -> Result<()> {
        let Some(patterns) = &self.patterns else {
            return Ok(());
        };
        patterns.record_failure(fingerprint, 0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uom_contracts::external_client::AnalyzeOutcome;
    use uom_model::file_context::{FileContext, FileLocator, OrgSecurityPolicy, UserContext};
    use uom_model::ids::CorrelationId;

    struct StubAnalyze {
        response: serde_json::Value,
    }

    #[async_trait]
    impl SyncAnalyzeClient for StubAnalyze {
        fn service_name(&self) -> &str {
            "stub"
        }

        async fn analyze(&self, _meta: &RequestMeta, _payload: serde_json::Value) -> Result<AnalyzeOutcome> {
            Ok(AnalyzeOutcome {
                result: Some(self.response.clone()),
                pending: None,
            })
        }

        async fn poll(&self, _meta: &RequestMeta, _pending: &PendingAnalyze) -> Result<AnalyzeOutcome> {
            unreachable!("stub never returns pending")
        }
    }

    fn file() -> FileContext {
        FileContext::new(
            "report.pdf",
            "application/pdf",
            2048,
            FileLocator::StoragePath("/tmp/x".into()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn falls_back_to_heuristic_with_no_backend_configured() {
        let engine = LlmDecisionEngine::new(None, None, None);
        let file = file();
        let user = UserContext::anonymous();
        let org = OrgSecurityPolicy::default();
        let ctx = DecisionContext {
            correlation_id: CorrelationId::new(),
            file: &file,
            user: &user,
            org_policies: &org,
            sandbox_result: None,
            security_decision: None,
            route_decision: None,
            processing_result: None,
        };
        let decision = engine.decide_initial_triage(&ctx).await.unwrap();
        assert_eq!(decision.source, DecisionSource::FastPath);
        assert_eq!(decision.confidence, 0.7);
    }

    #[tokio::test]
    async fn primary_backend_response_wins_over_fallback() {
        let primary = Arc::new(StubAnalyze {
            response: serde_json::json!({
                "sandbox_tier": "Tier2",
                "priority": 6,
                "timeout_ms": 45000,
                "tools": ["magic_detect"],
                "reason": "llm primary"
            }),
        });
        let engine = LlmDecisionEngine::new(Some(primary), None, None);
        let file = file();
        let user = UserContext::anonymous();
        let org = OrgSecurityPolicy::default();
        let ctx = DecisionContext {
            correlation_id: CorrelationId::new(),
            file: &file,
            user: &user,
            org_policies: &org,
            sandbox_result: None,
            security_decision: None,
            route_decision: None,
            processing_result: None,
        };
        let decision = engine.decide_initial_triage(&ctx).await.unwrap();
        assert_eq!(decision.source, DecisionSource::LlmPrimary);
        assert_eq!(decision.decision.priority, 6);
    }
}
