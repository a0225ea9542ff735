use thiserror::Error;

/// Errors surfaced by model-level invariants (construction, validation).
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("file context is invalid: {0}")]
    InvalidFileContext(String),

    #[error("decision payload did not match decision point {0:?}")]
    DecisionPointMismatch(crate::decision::DecisionPoint),

    #[error("pattern success counters are inconsistent: {0}")]
    InvalidPatternCounters(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
