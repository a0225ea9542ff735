//! Runs a cached pattern's body.
//! MageAgent is treated as the only service capable of actually
//! executing arbitrary processing code, so the executor is just another
//! `SyncAnalyzeClient` call shaped around the pattern's language/code.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use uom_contracts::error::Result;
use uom_contracts::external_client::{RequestMeta, SyncAnalyzeClient};
use uom_contracts::pattern_cache::{PatternExecutionOutcome, PatternExecutor};
use uom_model::file_context::FileContext;
use uom_model::pattern::ProcessingPattern;

/// Executes patterns by handing their `processing_code`/`language`/`file`
/// to MageAgent as a one-shot orchestration call.
pub struct MageAgentPatternExecutor {
    client: Arc<dyn SyncAnalyzeClient>,
}

impl MageAgentPatternExecutor {
    pub fn new(client: Arc<dyn SyncAnalyzeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PatternExecutor for MageAgentPatternExecutor {
    async fn execute(&self, pattern: &ProcessingPattern, file: &FileContext) -> Result<PatternExecutionOutcome> {
        let meta = RequestMeta {
            correlation_id: uom_model::ids::CorrelationId::new().to_string(),
            internal_service_id: "uom-orchestrator".into(),
        };
        let payload = serde_json::json!({
            "mode": "execute_pattern",
            "language": format!("{:?}", pattern.language),
            "processing_code": pattern.processing_code,
            "packages": pattern.packages,
            "file": file,
        });
        let started = Instant::now();
        let outcome = self.client.analyze(&meta, payload).await?;
        let elapsed = started.elapsed().as_millis() as u64;
        match outcome.result {
            Some(value) => Ok(PatternExecutionOutcome {
                success: true,
                extracted_content: Some(value.to_string()),
                metadata: Some(value),
                artifacts: Vec::new(),
                processing_method: "pattern_cache".into(),
                execution_time_ms: elapsed,
                error: None,
            }),
            None => Ok(PatternExecutionOutcome {
                success: false,
                extracted_content: None,
                metadata: None,
                artifacts: Vec::new(),
                processing_method: "pattern_cache".into(),
                execution_time_ms: elapsed,
                error: Some("pattern execution returned no result".into()),
            }),
        }
    }
}
