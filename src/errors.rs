use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("NOT_INITIALIZED: {0}")]
    NotInitialized(String),
    #[error("ENGINE_FAILURE: {0}")]
    EngineFailure(String),
    #[error("INVALID_PROGRESSION_VALUE: {0}")]
    InvalidProgressionValue(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("DECOMPOSITION_FAILED: {0}")]
    Decomposition(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::EngineFailure(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking store task failed: {}", value))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        Self::Decomposition(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
