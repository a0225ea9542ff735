use thiserror::Error;

/// Error kinds a stage or a downstream call can surface. Named after the
/// taxonomy the orchestrator reasons about rather than after any particular
/// transport.
#[derive(Error, Debug)]
pub enum ContractError {
    #[error("request failed validation: {0}")]
    ValidationFailed(String),

    #[error("recoverable failure calling {service}: {message}")]
    Transient { service: String, message: String },

    #[error("unrecoverable failure calling {service}: {message}")]
    Fatal { service: String, message: String },

    #[error("circuit breaker for {service} is open")]
    BreakerOpen { service: String },

    #[error("operation against {service} exceeded its timeout")]
    Timeout { service: String },

    #[error("decoding response from {service} failed: {message}")]
    Decode { service: String, message: String },
}

impl ContractError {
    pub fn service(&self) -> Option<&str> {
        match self {
            ContractError::ValidationFailed(_) => None,
            ContractError::Transient { service, .. }
            | ContractError::Fatal { service, .. }
            | ContractError::BreakerOpen { service }
            | ContractError::Timeout { service }
            | ContractError::Decode { service, .. } => Some(service),
        }
    }

    /// Whether the orchestrator should treat this as `stage_transient`
    /// (proceed with a synthetic result) rather than `stage_fatal`.
    pub fn is_transient(&self) -> bool {
        matches!(self, ContractError::Transient { .. })
    }
}

pub type Result<T> = std::result::Result<T, ContractError>;
