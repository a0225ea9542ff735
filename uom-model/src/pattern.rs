#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::ids::PatternId;

/// Runtime a cached pattern's processing code executes under.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PatternLanguage {
    Python,
    Node,
    Go,
    Rust,
    Java,
    Bash,
}

/// A learned recipe for handling files that share a mime type and a set of
/// characteristics (e.g. "application/pdf" + "has_forms"). The pattern cache
/// looks these up before falling back to the decision engine.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProcessingPattern {
    pub id: PatternId,
    pub mime_type: String,
    pub file_characteristics: Vec<String>,
    pub language: PatternLanguage,
    pub processing_code: String,
    pub packages: Vec<String>,
    pub success_count: u64,
    pub failure_count: u64,
    pub average_execution_time_ms: u64,
}

impl ProcessingPattern {
    pub fn new(
        mime_type: impl Into<String>,
        file_characteristics: Vec<String>,
        language: PatternLanguage,
        processing_code: impl Into<String>,
        packages: Vec<String>,
    ) -> Self {
        Self {
            id: PatternId::new(),
            mime_type: mime_type.into(),
            file_characteristics,
            language,
            processing_code: processing_code.into(),
            packages,
            success_count: 0,
            failure_count: 0,
            average_execution_time_ms: 0,
        }
    }

    /// `successCount / (successCount + failureCount)`, 0.0 when the pattern
    /// has never executed.
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            return 0.0;
        }
        self.success_count as f64 / total as f64
    }

    pub fn total_executions(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn record_success(&mut self, execution_time_ms: u64) {
        self.success_count += 1;
        self.roll_average(execution_time_ms);
    }

    pub fn record_failure(&mut self, execution_time_ms: u64) {
        self.failure_count += 1;
        self.roll_average(execution_time_ms);
    }

    fn roll_average(&mut self, execution_time_ms: u64) {
        let n = self.total_executions();
        if n == 0 {
            self.average_execution_time_ms = execution_time_ms;
            return;
        }
        let prior_total = self.average_execution_time_ms * (n - 1);
        self.average_execution_time_ms = (prior_total + execution_time_ms) / n;
    }

    /// Fails if the counters were constructed directly rather than through
    /// [`ProcessingPattern::record_success`]/[`record_failure`].
    pub fn validate(&self) -> Result<()> {
        if self.total_executions() == 0 && self.average_execution_time_ms != 0 {
            return Err(ModelError::InvalidPatternCounters(
                "average_execution_time_ms set without any recorded executions".into(),
            ));
        }
        Ok(())
    }

    /// A pattern matches a file when the mime type is identical and every
    /// characteristic the pattern requires is present in the candidate set.
    pub fn matches(&self, mime_type: &str, characteristics: &[String]) -> bool {
        self.mime_type == mime_type
            && self
                .file_characteristics
                .iter()
                .all(|c| characteristics.contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProcessingPattern {
        ProcessingPattern::new(
            "application/pdf",
            vec!["has_forms".into()],
            PatternLanguage::Python,
            "extract_forms(file)",
            vec!["pypdf".into()],
        )
    }

    #[test]
    fn success_rate_is_zero_before_any_execution() {
        assert_eq!(sample().success_rate(), 0.0);
    }

    #[test]
    fn success_rate_tracks_recorded_outcomes() {
        let mut pattern = sample();
        pattern.record_success(100);
        pattern.record_success(200);
        pattern.record_failure(100);
        assert!((pattern.success_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(pattern.average_execution_time_ms, 133);
    }

    #[test]
    fn matches_requires_all_characteristics_present() {
        let pattern = sample();
        assert!(pattern.matches("application/pdf", &["has_forms".into(), "scanned".into()]));
        assert!(!pattern.matches("application/pdf", &["scanned".into()]));
        assert!(!pattern.matches("image/png", &["has_forms".into()]));
    }
}
