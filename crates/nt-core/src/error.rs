use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    #[error("Missing configuration key: {key}")]
    MissingKey { key: String },

    #[error("Configuration key {key} has the wrong type (expected {expected})")]
    WrongType { key: String, expected: &'static str },

    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}
