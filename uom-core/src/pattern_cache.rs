use async_trait::async_trait;
use sqlx::PgPool;

use uom_contracts::decision_engine::RequestFingerprint;
use uom_contracts::error::{ContractError, Result};
use uom_contracts::pattern_cache::{PatternCache, PatternMatch};
use uom_model::ids::PatternId;
use uom_model::pattern::{PatternLanguage, ProcessingPattern};

/// Relational-store-backed pattern cache, keyed by mime type +
/// extension (the fingerprint already bakes the size/extension bucket in).
pub struct SqlxPatternCache {
    pool: PgPool,
}

impl SqlxPatternCache {
    /// A pattern needs at least this many recorded executions before its
    /// success rate is trusted -- a single lucky run should not make a
    /// pattern immediately cacheable.
    const MIN_SAMPLE_SIZE: i64 = 5;

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the crate's migrations against `pool`. Call once at startup.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ContractError::Fatal {
                service: "pattern_cache".into(),
                message: e.to_string(),
            })
    }
}

fn language_to_str(language: PatternLanguage) -> &'static str {
    match language {
        PatternLanguage::Python => "python",
        PatternLanguage::Node => "node",
        PatternLanguage::Go => "go",
        PatternLanguage::Rust => "rust",
        PatternLanguage::Java => "java",
        PatternLanguage::Bash => "bash",
    }
}

fn language_from_str(value: &str) -> PatternLanguage {
    match value {
        "node" => PatternLanguage::Node,
        "go" => PatternLanguage::Go,
        "rust" => PatternLanguage::Rust,
        "java" => PatternLanguage::Java,
        "bash" => PatternLanguage::Bash,
        _ => PatternLanguage::Python,
    }
}

#[async_trait]
impl PatternCache for SqlxPatternCache {
    async fn find_pattern(
        &self,
        fingerprint: &RequestFingerprint,
        min_success_rate: f64,
    ) -> Result<Option<PatternMatch>> {
        let row = sqlx::query!(
            r#"
            SELECT id, mime_type, file_characteristics, language, processing_code,
                   packages, success_count, failure_count, average_execution_time_ms
            FROM processing_patterns
            WHERE fingerprint = $1
              AND (success_count + failure_count) >= $2
              AND (success_count::float8 / NULLIF(success_count + failure_count, 0)) >= $3
            ORDER BY (success_count::float8 / NULLIF(success_count + failure_count, 0)) DESC
            LIMIT 1
            "#,
            fingerprint.0,
            Self::MIN_SAMPLE_SIZE,
            min_success_rate,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ContractError::Fatal {
            service: "pattern_cache".into(),
            message: e.to_string(),
        })?;

        let Some(row) = row else { return Ok(None) };

        let pattern = ProcessingPattern {
            id: PatternId::from(row.id),
            mime_type: row.mime_type,
            file_characteristics: row.file_characteristics,
            language: language_from_str(&row.language),
            processing_code: row.processing_code,
            packages: row.packages,
            success_count: row.success_count as u64,
            failure_count: row.failure_count as u64,
            average_execution_time_ms: row.average_execution_time_ms as u64,
        };
        let confidence = pattern.success_rate().clamp(0.0, 1.0) as f32;
        Ok(Some(PatternMatch {
            reason: format!("cached pattern with success rate {:.2}", pattern.success_rate()),
            pattern,
            confidence,
        }))
    }

    async fn store_pattern(
        &self,
        fingerprint: &RequestFingerprint,
        pattern: ProcessingPattern,
    ) -> Result<PatternId> {
        let id = pattern.id.as_uuid();
        sqlx::query!(
            r#"
            INSERT INTO processing_patterns
                (id, fingerprint, mime_type, file_characteristics, language, processing_code,
                 packages, success_count, failure_count, average_execution_time_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 1, 0, 0)
            ON CONFLICT (fingerprint) DO NOTHING
            "#,
            id,
            fingerprint.0,
            pattern.mime_type,
            &pattern.file_characteristics,
            language_to_str(pattern.language),
            pattern.processing_code,
            &pattern.packages,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ContractError::Fatal {
            service: "pattern_cache".into(),
            message: e.to_string(),
        })?;
        Ok(PatternId::from(id))
    }

    async fn record_execution(
        &self,
        pattern_id: PatternId,
        success: bool,
        execution_time_ms: u64,
        _error: Option<String>,
    ) -> Result<()> {
        // Cumulative running mean: new_avg = old_avg + (x - old_avg) / n,
        // computed in SQL so the update is atomic against concurrent writers.
        sqlx::query!(
            r#"
            UPDATE processing_patterns
            SET success_count = success_count + CASE WHEN $2 THEN 1 ELSE 0 END,
                failure_count = failure_count + CASE WHEN $2 THEN 0 ELSE 1 END,
                average_execution_time_ms = (
                    (average_execution_time_ms * (success_count + failure_count) + $3)
                    / (success_count + failure_count + 1)
                )
            WHERE id = $1
            "#,
            pattern_id.as_uuid(),
            success,
            execution_time_ms as i64,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ContractError::Fatal {
            service: "pattern_cache".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    async fn record_success(&self, fingerprint: &RequestFingerprint, execution_time_ms: u64) -> Result<()> {
        if let Some(found) = self.find_pattern(fingerprint, 0.0).await? {
            self.record_execution(found.pattern.id, true, execution_time_ms, None).await?;
        }
        Ok(())
    }

    async fn record_failure(&self, fingerprint: &RequestFingerprint, execution_time_ms: u64) -> Result<()> {
        if let Some(found) = self.find_pattern(fingerprint, 0.0).await? {
            self.record_execution(found.pattern.id, false, execution_time_ms, None).await?;
        }
        Ok(())
    }
}
