use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::sandbox::RecommendationTarget;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DecisionPoint {
    InitialTriage,
    SecurityAssessment,
    ProcessingRoute,
    PostProcessing,
}

/// Where a decision ultimately came from. The orchestrator and the learner
/// both key off this to decide whether an outcome should be recorded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DecisionSource {
    PatternCache,
    LlmPrimary,
    LlmFallback,
    FastPath,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RouteTarget {
    CyberAgent,
    VideoAgent,
    GeoAgent,
    GitHubManager,
    MageAgent,
    FileProcess,
}

impl From<RecommendationTarget> for RouteTarget {
    fn from(value: RecommendationTarget) -> Self {
        match value {
            RecommendationTarget::CyberAgent => RouteTarget::CyberAgent,
            RecommendationTarget::VideoAgent => RouteTarget::VideoAgent,
            RecommendationTarget::GeoAgent => RouteTarget::GeoAgent,
            RecommendationTarget::GitHubManager => RouteTarget::GitHubManager,
            RecommendationTarget::MageAgent => RouteTarget::MageAgent,
            RecommendationTarget::FileProcess => RouteTarget::FileProcess,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TriageDecision {
    pub sandbox_tier: crate::sandbox::SandboxTier,
    pub priority: u8,
    pub timeout_ms: u64,
    pub tools: Vec<String>,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SecurityAction {
    Allow,
    Block,
    Review,
    Escalate,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SecurityDecision {
    pub action: SecurityAction,
    pub reason: String,
    pub review_queue: Option<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub notify_users: Vec<String>,
}

impl SecurityDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            action: SecurityAction::Allow,
            reason: reason.into(),
            review_queue: None,
            expires_at: None,
            notify_users: Vec::new(),
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            action: SecurityAction::Block,
            reason: reason.into(),
            review_queue: None,
            expires_at: None,
            notify_users: Vec::new(),
        }
    }

    pub fn review(reason: impl Into<String>, expires_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            action: SecurityAction::Review,
            reason: reason.into(),
            review_queue: Some("security_review".into()),
            expires_at: Some(expires_at),
            notify_users: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RouteDecision {
    pub target_service: RouteTarget,
    pub method: String,
    pub priority: u8,
    pub reason: String,
    pub config: Option<serde_json::Value>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StorageSink {
    Postgres,
    Qdrant,
    GraphRag,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PostProcessDecision {
    pub store_in: HashSet<StorageSinkOrdered>,
    pub index_for_search: bool,
    pub generate_embeddings: bool,
    pub notify_user: bool,
    pub learn_pattern: bool,
    pub reason: String,
}

/// `StorageSink` wrapped so it can live in an ordered collection; Stage 6
/// writes destinations sequentially in `storeIn` iteration order, so
/// callers should prefer [`PostProcessDecision::store_order`] over
/// iterating the set directly.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StorageSinkOrdered(pub StorageSink);

impl StorageSink {
    fn rank(self) -> u8 {
        match self {
            StorageSink::GraphRag => 0,
            StorageSink::Postgres => 1,
            StorageSink::Qdrant => 2,
        }
    }
}

impl PartialOrd for StorageSink {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StorageSink {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PostProcessDecision {
    pub fn on_success() -> Self {
        Self {
            store_in: [
                StorageSinkOrdered(StorageSink::GraphRag),
                StorageSinkOrdered(StorageSink::Postgres),
            ]
            .into_iter()
            .collect(),
            index_for_search: true,
            generate_embeddings: true,
            notify_user: false,
            learn_pattern: true,
            reason: "processing succeeded".into(),
        }
    }

    pub fn on_failure() -> Self {
        Self {
            store_in: [StorageSinkOrdered(StorageSink::Postgres)]
                .into_iter()
                .collect(),
            index_for_search: false,
            generate_embeddings: false,
            notify_user: false,
            learn_pattern: false,
            reason: "processing failed".into(),
        }
    }

    /// Destinations in the stable write order Stage 6 uses.
    pub fn store_order(&self) -> Vec<StorageSink> {
        let mut sinks: Vec<StorageSink> = self.store_in.iter().map(|s| s.0).collect();
        sinks.sort();
        sinks
    }
}

/// Generic envelope produced by the decision engine at every decision point.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UOMDecision<T> {
    pub decision_point: DecisionPoint,
    pub decision: T,
    pub confidence: f32,
    pub reason: String,
    pub duration_ms: u64,
    pub source: DecisionSource,
    pub learn_from_outcome: bool,
    pub alternatives: Vec<T>,
}

impl<T> UOMDecision<T> {
    pub fn fallback(decision_point: DecisionPoint, decision: T, reason: impl Into<String>) -> Self {
        Self {
            decision_point,
            decision,
            confidence: 0.7,
            reason: reason.into(),
            duration_ms: 0,
            source: DecisionSource::FastPath,
            learn_from_outcome: false,
            alternatives: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_order_is_graphrag_then_postgres() {
        let decision = PostProcessDecision::on_success();
        assert_eq!(
            decision.store_order(),
            vec![StorageSink::GraphRag, StorageSink::Postgres]
        );
    }

    #[test]
    fn fallback_decision_has_fixed_confidence_and_source() {
        let decision = UOMDecision::fallback(
            DecisionPoint::InitialTriage,
            TriageDecision {
                sandbox_tier: crate::sandbox::SandboxTier::Tier1,
                priority: 5,
                timeout_ms: 30_000,
                tools: vec!["magic_detect".into()],
                reason: "default".into(),
            },
            "no DE configured",
        );
        assert_eq!(decision.confidence, 0.7);
        assert_eq!(decision.source, DecisionSource::FastPath);
        assert!(!decision.learn_from_outcome);
    }
}
