pub mod circuit_breaker;
pub mod clients;
pub mod decision_engine;
pub mod dispatch_gate;
pub mod error;
pub mod events;
pub mod job_table;
pub mod orchestrator;
pub mod pattern_cache;
pub mod pattern_executor;
pub mod stages;

pub mod prelude {
    pub use crate::circuit_breaker::TokioCircuitBreaker;
    pub use crate::decision_engine::LlmDecisionEngine;
    pub use crate::dispatch_gate::{self, DispatchOutcome, UrlClassification};
    pub use crate::error::{OrchestratorError, Result};
    pub use crate::events::{JobEvent, JobEventChannel, JobEventKind};
    pub use crate::job_table::{JobEntry, JobTable};
    pub use crate::orchestrator::{Orchestrator, OrchestratorServices, OrchestratorStats, OrchestratorTimeouts};
    pub use crate::pattern_cache::SqlxPatternCache;
    pub use crate::pattern_executor::MageAgentPatternExecutor;
}
