use thiserror::Error;
use uom_contracts::error::ContractError;

/// Errors the orchestrator itself can surface, as distinct from the
/// per-call [`ContractError`]s its external clients raise.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("job {0} was not found")]
    JobNotFound(uom_model::ids::JobId),

    #[error("file failed validation: {0}")]
    ValidationFailed(String),

    #[error("stage `{stage}` failed: {source}")]
    StageFailed {
        stage: &'static str,
        #[source]
        source: ContractError,
    },

    #[error("job exceeded its wall-clock budget at stage `{stage}`")]
    TimedOut { stage: &'static str },

    #[error(transparent)]
    Contract(#[from] ContractError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
