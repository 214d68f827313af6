use crate::domain::ids::GroupId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EqubError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Group {group} was modified concurrently")]
    StaleWrite { group: GroupId },
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Coarse classification handed back to callers of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    Invalid,
    Internal,
}

impl EqubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) | Self::StaleWrite { .. } | Self::ConstraintViolation(_) => {
                ErrorKind::Conflict
            }
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::ValidationError(_) | Self::ConfigError(_) | Self::CsvError(_) => {
                ErrorKind::Invalid
            }
            _ => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, EqubError>;
