use thiserror::Error;

/// Stable codes a caller can match on, per spec §7's "Validation"/"Capacity"
/// error kinds. Names mirror the `code` strings returned to HTTP clients.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("input file not found: {0}")]
    FileNotFound(String),

    #[error("file is not an input file")]
    WrongPurpose,

    #[error("input file is empty")]
    EmptyFile,

    #[error("malformed input file: {0}")]
    MalformedInputFile(String),

    #[error("request count {count} exceeds MaxRequestsPerJob ({limit})")]
    RequestCountExceeded { count: u64, limit: u64 },

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("queue is full")]
    QueueFull,

    #[error("service unavailable: gpu unhealthy")]
    ServiceUnavailable,

    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),

    #[error(transparent)]
    ModelRegistry(#[from] crate::model_registry::ModelRegistryError),
}

pub type Result<T> = std::result::Result<T, AdmissionError>;
