use crate::schema::UploadStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Row {row} does not exist (upload has {len} rows)")]
    RowOutOfRange { row: usize, len: usize },

    #[error("Cannot move upload from {from:?} to {to:?}")]
    InvalidTransition { from: UploadStatus, to: UploadStatus },

    #[error("Upload {0} not found")]
    UploadNotFound(u64),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReviewError>;
