//! Trait surfaces implemented by the decision engine, the pattern cache, the
//! circuit breakers, and the downstream service clients. `uom-core` depends
//! on these traits rather than on any concrete backend, so the orchestrator
//! can be exercised against mocks in tests.

pub mod circuit_breaker;
pub mod decision_engine;
pub mod error;
pub mod external_client;
pub mod fallback;
pub mod pattern_cache;

pub mod prelude {
    pub use super::circuit_breaker::{execute as execute_with_breaker, CircuitBreaker};
    pub use super::decision_engine::{DecisionContext, DecisionEngine, RequestFingerprint};
    pub use super::error::{ContractError, Result};
    pub use super::external_client::{
        AnalyzeOutcome, PendingAnalyze, PollPolicy, RemoteJobStatus, RequestMeta, ScanProtocolClient,
        ScanStatusReport, ScanSubmission, StorageSinkClient, SyncAnalyzeClient,
    };
    pub use super::pattern_cache::{
        PatternCache, PatternExecutionOutcome, PatternExecutor, PatternMatch, DEFAULT_MIN_SUCCESS_RATE,
    };
}
