use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),

    #[error("configuration field `{field}` is invalid: {message}")]
    Invalid { field: String, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigLoadError>;
