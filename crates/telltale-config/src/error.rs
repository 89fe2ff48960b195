//! Error types for configuration loading and validation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    // Config parsing/loading errors
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}
