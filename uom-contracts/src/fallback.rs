//! The fallback heuristics required by the decision engine contract when no
//! LLM backend is configured. These are pure functions: given the same
//! inputs they always produce the same [`UOMDecision`], with
//! `confidence = 0.7`, `source = fast_path`, `learn_from_outcome = false`.

use uom_model::prelude::*;

const KNOWN_BINARY_EXTENSIONS: &[&str] = &["exe", "dll", "so", "dylib", "bin", "msi", "elf"];
const KNOWN_BINARY_MIMES: &[&str] = &[
    "application/x-msdownload",
    "application/x-executable",
    "application/x-sharedlib",
    "application/x-mach-binary",
];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar", "gz", "7z", "rar", "bz2"];
const ARCHIVE_MIMES: &[&str] = &[
    "application/zip",
    "application/x-tar",
    "application/gzip",
    "application/x-7z-compressed",
    "application/vnd.rar",
];
const VIDEO_FORMATS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "m4v", "mpeg", "mpg"];

fn matches_any(value: &str, set: &[&str]) -> bool {
    set.iter().any(|candidate| *candidate == value)
}

/// Stage 1 fallback: classify by well-known extension/MIME sets only.
pub fn triage_fallback(file: &FileContext) -> UOMDecision<TriageDecision> {
    let ext = file.extension().unwrap_or("");
    let decision = if matches_any(&file.mime_type, KNOWN_BINARY_MIMES) || matches_any(ext, KNOWN_BINARY_EXTENSIONS) {
        TriageDecision {
            sandbox_tier: SandboxTier::Tier3,
            priority: 9,
            timeout_ms: 120_000,
            tools: vec![
                "magic_detect".into(),
                "yara_full".into(),
                "ghidra".into(),
                "strings".into(),
            ],
            reason: "known binary format".into(),
        }
    } else if matches_any(&file.mime_type, ARCHIVE_MIMES) || matches_any(ext, ARCHIVE_EXTENSIONS) {
        TriageDecision {
            sandbox_tier: SandboxTier::Tier2,
            priority: 7,
            timeout_ms: 60_000,
            tools: vec!["magic_detect".into(), "yara_quick".into(), "archive_scan".into()],
            reason: "archive container".into(),
        }
    } else {
        TriageDecision {
            sandbox_tier: SandboxTier::Tier1,
            priority: 5,
            timeout_ms: 30_000,
            tools: vec!["magic_detect".into(), "yara_quick".into()],
            reason: "default tier".into(),
        }
    };
    UOMDecision::fallback(DecisionPoint::InitialTriage, decision, "no decision engine configured")
}

/// Stage 3 fallback: threat level drives the action directly.
pub fn security_fallback(sandbox: &SandboxAnalysisResult) -> UOMDecision<SecurityDecision> {
    let decision = if sandbox.security.is_malicious || sandbox.security.threat_level == ThreatLevel::Critical {
        SecurityDecision::block("malicious or critical threat level")
    } else if sandbox.security.threat_level == ThreatLevel::High {
        SecurityDecision::review(
            "high threat level requires human review",
            chrono::Utc::now() + chrono::Duration::hours(24),
        )
    } else {
        SecurityDecision::allow("threat level below review threshold")
    };
    UOMDecision::fallback(
        DecisionPoint::SecurityAssessment,
        decision,
        "no decision engine configured",
    )
}

/// Stage 4 fallback. `is_github_repo_url` is supplied by the URL classifier
/// upstream of the orchestrator (the dispatch gate); the orchestrator only
/// ever reaches this fallback for requests the gate did not already
/// short-circuit.
pub fn route_fallback(
    classification: &Classification,
    sandbox: &SandboxAnalysisResult,
    is_github_repo_url: bool,
) -> UOMDecision<RouteDecision> {
    let decision = if is_github_repo_url {
        RouteDecision {
            target_service: RouteTarget::GitHubManager,
            method: "repo_ingestion".into(),
            priority: 5,
            reason: "GitHub repository URL".into(),
            config: None,
        }
    } else if let Some(recommendation) = sandbox.highest_priority_recommendation() {
        RouteDecision {
            target_service: recommendation.target_service.into(),
            method: recommendation.method.clone(),
            priority: recommendation.priority,
            reason: format!("sandbox recommendation: {}", recommendation.reason),
            config: None,
        }
    } else {
        let (target, method) = match classification {
            Classification::Binary => (RouteTarget::CyberAgent, "analyze_binary"),
            Classification::Geo | Classification::PointCloud => (RouteTarget::GeoAgent, "process_geospatial"),
            Classification::Media => {
                let is_video = VIDEO_FORMATS
                    .iter()
                    .any(|format| sandbox.detected_format.eq_ignore_ascii_case(format));
                if is_video {
                    (RouteTarget::VideoAgent, "process_video")
                } else {
                    (RouteTarget::MageAgent, "orchestrate")
                }
            }
            Classification::Document => (RouteTarget::FileProcess, "document_extraction"),
            Classification::Archive | Classification::Code | Classification::Data | Classification::Unknown => {
                (RouteTarget::MageAgent, "orchestrate")
            }
        };
        RouteDecision {
            target_service: target,
            method: method.into(),
            priority: 5,
            reason: "classification-based default route".into(),
            config: None,
        }
    };
    UOMDecision::fallback(DecisionPoint::ProcessingRoute, decision, "no decision engine configured")
}

/// Fast path ahead of Stage 1's LLM call: a well-known binary format's
/// sandbox tier is not a judgment call.
pub fn fast_path_triage(file: &FileContext) -> Option<TriageDecision> {
    let ext = file.extension().unwrap_or("");
    if matches_any(&file.mime_type, KNOWN_BINARY_MIMES) || matches_any(ext, KNOWN_BINARY_EXTENSIONS) {
        return Some(TriageDecision {
            sandbox_tier: SandboxTier::Tier3,
            priority: 9,
            timeout_ms: 120_000,
            tools: vec![
                "magic_detect".into(),
                "yara_full".into(),
                "ghidra".into(),
                "strings".into(),
            ],
            reason: "known binary format".into(),
        });
    }
    None
}

/// Fast path ahead of Stage 3's LLM call: malicious or critical findings
/// always block, regardless of what an LLM might say.
pub fn fast_path_security(sandbox: &SandboxAnalysisResult) -> Option<SecurityDecision> {
    if sandbox.security.is_malicious || sandbox.security.threat_level == ThreatLevel::Critical {
        return Some(SecurityDecision::block("malicious or critical threat level"));
    }
    None
}

/// Fast path ahead of Stage 4's LLM call: a GitHub repository URL, or a
/// sandbox recommendation the sandbox itself is already highly confident in.
pub fn fast_path_route(sandbox: &SandboxAnalysisResult, is_github_repo_url: bool) -> Option<RouteDecision> {
    if is_github_repo_url {
        return Some(RouteDecision {
            target_service: RouteTarget::GitHubManager,
            method: "repo_ingestion".into(),
            priority: 5,
            reason: "GitHub repository URL".into(),
            config: None,
        });
    }
    let recommendation = sandbox.highest_priority_recommendation()?;
    if recommendation.confidence >= 0.9 {
        return Some(RouteDecision {
            target_service: recommendation.target_service.into(),
            method: recommendation.method.clone(),
            priority: recommendation.priority,
            reason: format!("sandbox recommendation: {}", recommendation.reason),
            config: None,
        });
    }
    None
}

/// Fast path ahead of Stage 6's LLM call: a failed processing run always
/// gets the same conservative, no-learn storage decision.
pub fn fast_path_post_process(success: bool) -> Option<PostProcessDecision> {
    if !success {
        return Some(PostProcessDecision::on_failure());
    }
    None
}

/// Stage 6 fallback.
pub fn post_process_fallback(success: bool) -> UOMDecision<PostProcessDecision> {
    let decision = if success {
        PostProcessDecision::on_success()
    } else {
        PostProcessDecision::on_failure()
    };
    UOMDecision::fallback(DecisionPoint::PostProcessing, decision, "no decision engine configured")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uom_model::file_context::FileLocator;

    fn file(mime: &str, name: &str) -> FileContext {
        FileContext::new(name, mime, 1024, FileLocator::StoragePath("/tmp/x".into())).unwrap()
    }

    #[test]
    fn known_binary_gets_tier3() {
        let decision = triage_fallback(&file("application/x-msdownload", "installer.exe"));
        assert_eq!(decision.decision.sandbox_tier, SandboxTier::Tier3);
        assert_eq!(decision.decision.priority, 9);
        assert_eq!(decision.confidence, 0.7);
    }

    #[test]
    fn archive_gets_tier2() {
        let decision = triage_fallback(&file("application/zip", "bundle.zip"));
        assert_eq!(decision.decision.sandbox_tier, SandboxTier::Tier2);
    }

    #[test]
    fn unknown_file_gets_tier1_default() {
        let decision = triage_fallback(&file("application/pdf", "report.pdf"));
        assert_eq!(decision.decision.sandbox_tier, SandboxTier::Tier1);
    }

    #[test]
    fn malicious_file_always_blocks() {
        let sandbox = SandboxAnalysisResult::synthetic_failure(SandboxTier::Tier1, 10, "c1".into());
        let mut sandbox = sandbox;
        sandbox.security = SecurityFindings::new(ThreatLevel::Critical, true, vec![]);
        let decision = security_fallback(&sandbox);
        assert_eq!(decision.decision.action, SecurityAction::Block);
    }

    #[test]
    fn medium_threat_level_allows() {
        let sandbox = SandboxAnalysisResult::synthetic_failure(SandboxTier::Tier1, 10, "c1".into());
        let decision = security_fallback(&sandbox);
        assert_eq!(decision.decision.action, SecurityAction::Allow);
    }

    #[test]
    fn high_threat_level_routes_to_review() {
        let mut sandbox = SandboxAnalysisResult::synthetic_failure(SandboxTier::Tier1, 10, "c1".into());
        sandbox.security = SecurityFindings::new(ThreatLevel::High, false, vec![]);
        let decision = security_fallback(&sandbox);
        assert_eq!(decision.decision.action, SecurityAction::Review);
        assert!(decision.decision.expires_at.is_some());
    }

    #[test]
    fn github_url_routes_to_github_manager_regardless_of_classification() {
        let sandbox = SandboxAnalysisResult::synthetic_failure(SandboxTier::Tier1, 10, "c1".into());
        let decision = route_fallback(&Classification::Unknown, &sandbox, true);
        assert_eq!(decision.decision.target_service, RouteTarget::GitHubManager);
    }

    #[test]
    fn document_classification_routes_to_fileprocess_without_recommendations() {
        let sandbox = SandboxAnalysisResult::synthetic_failure(SandboxTier::Tier1, 10, "c1".into());
        let decision = route_fallback(&Classification::Document, &sandbox, false);
        assert_eq!(decision.decision.target_service, RouteTarget::FileProcess);
    }

    #[test]
    fn video_media_routes_to_videoagent() {
        let mut sandbox = SandboxAnalysisResult::synthetic_failure(SandboxTier::Tier1, 10, "c1".into());
        sandbox.detected_format = "mp4".into();
        let decision = route_fallback(&Classification::Media, &sandbox, false);
        assert_eq!(decision.decision.target_service, RouteTarget::VideoAgent);
    }

    #[test]
    fn non_video_media_routes_to_mageagent() {
        let mut sandbox = SandboxAnalysisResult::synthetic_failure(SandboxTier::Tier1, 10, "c1".into());
        sandbox.detected_format = "flac".into();
        let decision = route_fallback(&Classification::Media, &sandbox, false);
        assert_eq!(decision.decision.target_service, RouteTarget::MageAgent);
    }

    #[test]
    fn fast_path_triage_only_matches_known_binaries() {
        assert!(fast_path_triage(&file("application/x-msdownload", "installer.exe")).is_some());
        assert!(fast_path_triage(&file("application/pdf", "report.pdf")).is_none());
    }

    #[test]
    fn fast_path_security_only_matches_malicious_or_critical() {
        let mut sandbox = SandboxAnalysisResult::synthetic_failure(SandboxTier::Tier1, 10, "c1".into());
        assert!(fast_path_security(&sandbox).is_none());
        sandbox.security = SecurityFindings::new(ThreatLevel::Critical, true, vec![]);
        assert!(fast_path_security(&sandbox).is_some());
    }
}
