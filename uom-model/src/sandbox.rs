#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sandbox analysis depth. `Tier3` includes full tooling such as
/// decompilation; `Tier1` is fast static inspection only.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SandboxTier {
    Tier1,
    Tier2,
    Tier3,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Classification {
    Binary,
    Document,
    Archive,
    Media,
    Code,
    Data,
    Geo,
    PointCloud,
    Unknown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ThreatLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SecurityFindings {
    pub threat_level: ThreatLevel,
    pub is_malicious: bool,
    pub should_block: bool,
    pub flags: Vec<String>,
    pub yara_rules: Vec<String>,
}

impl SecurityFindings {
    /// Enforces the invariant `is_malicious => should_block`.
    pub fn new(threat_level: ThreatLevel, is_malicious: bool, flags: Vec<String>) -> Self {
        Self {
            threat_level,
            is_malicious,
            should_block: is_malicious,
            flags,
            yara_rules: Vec::new(),
        }
    }

    pub fn safe() -> Self {
        Self::new(ThreatLevel::Safe, false, Vec::new())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RecommendationTarget {
    CyberAgent,
    VideoAgent,
    GeoAgent,
    GitHubManager,
    MageAgent,
    FileProcess,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Recommendation {
    pub target_service: RecommendationTarget,
    pub method: String,
    /// Lower is more urgent, matching the sandbox's own ordering.
    pub priority: u8,
    pub reason: String,
    pub confidence: f32,
}

/// Output of the sandbox stage (Stage 2).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SandboxAnalysisResult {
    pub classification: Classification,
    pub detected_format: String,
    pub classification_confidence: f32,
    pub security: SecurityFindings,
    pub recommendations: Vec<Recommendation>,
    pub tools_used: Vec<String>,
    pub duration_ms: u64,
    pub tier: SandboxTier,
    pub analysis_id: String,
    pub correlation_id: String,
}

impl SandboxAnalysisResult {
    /// The synthetic result produced when the sandbox service itself is
    /// unavailable. The pipeline must proceed rather than fail the job.
    pub fn synthetic_failure(tier: SandboxTier, duration_ms: u64, correlation_id: String) -> Self {
        Self {
            classification: Classification::Unknown,
            detected_format: "unknown".into(),
            classification_confidence: 0.0,
            security: SecurityFindings::new(
                ThreatLevel::Medium,
                false,
                vec!["sandbox_analysis_failed".into()],
            ),
            recommendations: Vec::new(),
            tools_used: Vec::new(),
            duration_ms,
            tier,
            analysis_id: String::new(),
            correlation_id,
        }
    }

    pub fn highest_priority_recommendation(&self) -> Option<&Recommendation> {
        self.recommendations.iter().min_by_key(|r| r.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malicious_always_blocks() {
        let findings = SecurityFindings::new(ThreatLevel::Critical, true, vec![]);
        assert!(findings.should_block);
    }

    #[test]
    fn synthetic_failure_is_medium_and_not_malicious() {
        let result = SandboxAnalysisResult::synthetic_failure(SandboxTier::Tier1, 42, "c1".into());
        assert_eq!(result.security.threat_level, ThreatLevel::Medium);
        assert!(!result.security.is_malicious);
        assert!(
            result
                .security
                .flags
                .contains(&"sandbox_analysis_failed".to_string())
        );
    }

    #[test]
    fn highest_priority_recommendation_picks_lowest_number() {
        let result = SandboxAnalysisResult {
            classification: Classification::Binary,
            detected_format: "pe32".into(),
            classification_confidence: 0.9,
            security: SecurityFindings::safe(),
            recommendations: vec![
                Recommendation {
                    target_service: RecommendationTarget::MageAgent,
                    method: "dynamic".into(),
                    priority: 5,
                    reason: "fallback".into(),
                    confidence: 0.4,
                },
                Recommendation {
                    target_service: RecommendationTarget::CyberAgent,
                    method: "decompile".into(),
                    priority: 1,
                    reason: "binary".into(),
                    confidence: 0.9,
                },
            ],
            tools_used: vec![],
            duration_ms: 10,
            tier: SandboxTier::Tier3,
            analysis_id: "a1".into(),
            correlation_id: "c1".into(),
        };
        let top = result.highest_priority_recommendation().unwrap();
        assert_eq!(top.target_service, RecommendationTarget::CyberAgent);
    }
}
