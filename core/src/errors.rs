use thiserror::Error;

/// Completion API errors
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("API Error: {message} (type: {error_type})")]
    ApiError { message: String, error_type: String },

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Request Error: {0}")]
    RequestError(String),

    #[error("Parsing Error: {0}")]
    ParsingError(String),

    #[error("HTTP Error: {status_code} - {message}")]
    HttpError { status_code: u16, message: String },

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),
}

/// Result type for completion operations
pub type CompletionResult<T> = Result<T, CompletionError>;
