use async_trait::async_trait;
use uom_model::prelude::*;

use crate::error::Result;

/// Everything a decision point needs to reason about a request. Borrowed
/// rather than owned -- the orchestrator builds one of these from the live
/// `Job` on each stage entry.
#[derive(Debug)]
pub struct DecisionContext<'a> {
    pub correlation_id: CorrelationId,
    pub file: &'a FileContext,
    pub user: &'a UserContext,
    pub org_policies: &'a OrgSecurityPolicy,
    pub sandbox_result: Option<&'a SandboxAnalysisResult>,
    pub security_decision: Option<&'a SecurityDecision>,
    pub route_decision: Option<&'a RouteDecision>,
    pub processing_result: Option<&'a ProcessingResult>,
}

/// A fingerprint over (mimeType, extension bucket, size bucket, decision
/// point) used to key the pattern cache. Two requests with the same
/// fingerprint may share a cached pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestFingerprint(pub String);

impl RequestFingerprint {
    pub fn compute(ctx: &DecisionContext<'_>, point: DecisionPoint) -> Self {
        let extension_bucket = ctx.file.extension().unwrap_or("none");
        let size_bucket = size_bucket(ctx.file.file_size);
        Self(format!(
            "{}:{}:{}:{:?}",
            ctx.file.mime_type, extension_bucket, size_bucket, point
        ))
    }
}

fn size_bucket(size: u64) -> &'static str {
    match size {
        0..=102_400 => "xs",
        102_401..=1_048_576 => "sm",
        1_048_577..=10_485_760 => "md",
        10_485_761..=104_857_600 => "lg",
        _ => "xl",
    }
}

/// The LLM-backed decision engine. Every `decide*` method follows the same
/// resolution order internally: pattern cache, then fast path, then primary
/// LLM, then fallback LLM. Implementations that have no LLM backend at all
/// still satisfy this trait by always returning the fixed-confidence
/// fallback from [`crate::fallback`].
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn decide_initial_triage(
        &self,
        ctx: &DecisionContext<'_>,
    ) -> Result<UOMDecision<TriageDecision>>;

    async fn decide_security_assessment(
        &self,
        ctx: &DecisionContext<'_>,
    ) -> Result<UOMDecision<SecurityDecision>>;

    async fn decide_processing_route(
        &self,
        ctx: &DecisionContext<'_>,
    ) -> Result<UOMDecision<RouteDecision>>;

    async fn decide_post_processing(
        &self,
        ctx: &DecisionContext<'_>,
    ) -> Result<UOMDecision<PostProcessDecision>>;

    /// Persists a pattern learned from a successful decision/outcome pair.
    /// `decision_json` is the serialized decision itself, so a later request
    /// with the same fingerprint can be answered straight from the cache.
    async fn store_pattern(
        &self,
        fingerprint: &RequestFingerprint,
        point: DecisionPoint,
        decision_json: serde_json::Value,
        initial_confidence: f32,
    ) -> Result<PatternId>;

    /// Records that the decision made for this request did not hold up,
    /// so the pattern cache (if any) can down-weight or retire it.
    async fn record_pattern_failure(
        &self,
        fingerprint: &RequestFingerprint,
        point: DecisionPoint,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use uom_model::file_context::FileLocator;

    #[test]
    fn fingerprint_differs_by_decision_point() {
        let file = FileContext::new(
            "report.pdf",
            "application/pdf",
            2048,
            FileLocator::StoragePath("/tmp/x".into()),
        )
        .unwrap();
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
        let triage = RequestFingerprint::compute(&ctx, DecisionPoint::InitialTriage);
        let route = RequestFingerprint::compute(&ctx, DecisionPoint::ProcessingRoute);
        assert_ne!(triage, route);
    }
}
