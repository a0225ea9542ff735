use async_trait::async_trait;
use uom_model::prelude::*;

use crate::decision_engine::RequestFingerprint;
use crate::error::Result;

/// Outcome of `FindPattern`: the candidate pattern plus how confident the
/// cache is in recommending it (the pattern's own success rate).
#[derive(Clone, Debug)]
pub struct PatternMatch {
    pub pattern: ProcessingPattern,
    pub confidence: f32,
    pub reason: String,
}

/// Outcome of a pattern execution, returned by whatever external
/// code-execution service actually ran the pattern body.
#[derive(Clone, Debug)]
pub struct PatternExecutionOutcome {
    pub success: bool,
    pub extracted_content: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub artifacts: Vec<String>,
    pub processing_method: String,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

/// Persistent store of learned [`ProcessingPattern`]s, keyed by
/// [`RequestFingerprint`]. Read-mostly: lookups happen on every decision,
/// writes happen roughly once per job completion.
#[async_trait]
pub trait PatternCache: Send + Sync {
    /// Highest-quality pattern whose `success_rate >= min_success_rate`
    /// (default 0.80), or `None` if no pattern clears the bar.
    async fn find_pattern(
        &self,
        fingerprint: &RequestFingerprint,
        min_success_rate: f64,
    ) -> Result<Option<PatternMatch>>;

    /// Creates a new pattern if none exists for the fingerprint, seeded with
    /// `success_count = 1, failure_count = 0`.
    async fn store_pattern(
        &self,
        fingerprint: &RequestFingerprint,
        pattern: ProcessingPattern,
    ) -> Result<PatternId>;

    /// Updates a pattern's counters and rolling-average execution time.
    async fn record_execution(
        &self,
        pattern_id: PatternId,
        success: bool,
        execution_time_ms: u64,
        error: Option<String>,
    ) -> Result<()>;

    /// Convenience wrapper used by the orchestrator at Stage 6 on success.
    async fn record_success(&self, fingerprint: &RequestFingerprint, execution_time_ms: u64) -> Result<()>;

    /// Convenience wrapper used by the orchestrator at Stage 6 on failure.
    async fn record_failure(&self, fingerprint: &RequestFingerprint, execution_time_ms: u64) -> Result<()>;
}

/// Runs a cached pattern's body against a file. Used by the dispatch gate
/// for unknown MIME types with a cache hit: success short-circuits the
/// orchestrator entirely, failure falls through to full MageAgent
/// processing and the pattern records the failure.
#[async_trait]
pub trait PatternExecutor: Send + Sync {
    async fn execute(
        &self,
        pattern: &ProcessingPattern,
        file: &FileContext,
    ) -> Result<PatternExecutionOutcome>;
}

pub const DEFAULT_MIN_SUCCESS_RATE: f64 = 0.80;
