//! Shared data model for the Unified Orchestration Monitor (UOM).
//!
//! This crate holds the types that flow between the dispatch gate, the
//! orchestrator, the decision engine, and the pattern cache. It has no
//! knowledge of HTTP, LLM backends, or any specific downstream analysis
//! service -- those live in `uom-contracts` (trait surfaces) and `uom-core`
//! (implementations).

pub mod breaker;
pub mod decision;
pub mod error;
pub mod file_context;
pub mod ids;
pub mod job;
pub mod pattern;
pub mod sandbox;

pub mod prelude {
    pub use super::breaker::{BreakerConfig, CircuitBreakerState, CircuitState};
    pub use super::decision::{
        DecisionPoint, DecisionSource, PostProcessDecision, RouteDecision, RouteTarget,
        SecurityAction, SecurityDecision, TriageDecision, UOMDecision,
    };
    pub use super::error::{ModelError, Result};
    pub use super::file_context::{FileContext, OrgSecurityPolicy, UserContext};
    pub use super::ids::{CorrelationId, JobId, PatternId};
    pub use super::job::{Job, JobStatus, ProcessingResult, StageMessage};
    pub use super::pattern::{PatternLanguage, ProcessingPattern};
    pub use super::sandbox::{
        Classification, Recommendation, SandboxAnalysisResult, SandboxTier, SecurityFindings,
        ThreatLevel,
    };
}
