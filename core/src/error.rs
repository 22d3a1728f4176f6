use thiserror::Error;

#[derive(Error, Debug)]
pub enum StaffingError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Model unavailable at {path}: {reason}")]
    ModelUnavailable { path: String, reason: String },

    #[error("Invalid input: {field} = {value}")]
    InvalidInput { field: &'static str, value: f64 },

    #[error("Unknown segment '{label}'")]
    UnknownSegment { label: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StaffingError {
    pub fn config(reason: impl Into<String>) -> Self {
        StaffingError::InvalidConfig { reason: reason.into() }
    }
}

pub type StaffingResult<T> = Result<T, StaffingError>;
