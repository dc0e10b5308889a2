use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::admission::AdmissionError;
use crate::ledger::LedgerError;
use crate::model_registry::ModelRegistryError;
use crate::storage::StorageError;
use crate::webhook::WebhookError;

/// Errors surfaced to HTTP clients, mapped to the status-code table in
/// spec §6.1 and the error taxonomy in §7. Internal component errors
/// fold into one of these via `From`, so a handler only has to know the
/// HTTP shape, never which component originated the failure.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("queue is full")]
    QueueFull,
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownModel(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidTransition(_) => StatusCode::CONFLICT,
            ApiError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "InvalidRequest",
            ApiError::UnknownModel(_) => "UnknownModel",
            ApiError::NotFound(_) => "NotFound",
            ApiError::InvalidTransition(_) => "InvalidTransition",
            ApiError::QueueFull => "QueueFull",
            ApiError::ServiceUnavailable(_) => "ServiceUnavailable",
            ApiError::Internal(_) => "Internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::FileNotFound(id) => ApiError::NotFound(format!("file {id}")),
            AdmissionError::WrongPurpose | AdmissionError::EmptyFile => {
                ApiError::InvalidRequest(err.to_string())
            }
            AdmissionError::MalformedInputFile(msg) => ApiError::InvalidRequest(msg),
            AdmissionError::RequestCountExceeded { .. } => {
                ApiError::InvalidRequest(err.to_string())
            }
            AdmissionError::UnknownModel(name) => ApiError::UnknownModel(name),
            AdmissionError::QueueFull => ApiError::QueueFull,
            AdmissionError::ServiceUnavailable => ApiError::ServiceUnavailable(err.to_string()),
            AdmissionError::Ledger(e) => ApiError::Internal(e.to_string()),
            AdmissionError::Storage(e) => ApiError::Internal(e.to_string()),
            AdmissionError::ModelRegistry(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::JobNotFound(id) => ApiError::NotFound(format!("batch {id}")),
            LedgerError::FileNotFound(id) => ApiError::NotFound(format!("file {id}")),
            LedgerError::InvalidTransition(msg) => ApiError::InvalidTransition(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ApiError::NotFound(id),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ModelRegistryError> for ApiError {
    fn from(err: ModelRegistryError) -> Self {
        match err {
            ModelRegistryError::UnknownModel(name) => ApiError::UnknownModel(name),
            ModelRegistryError::Ledger(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Ledger(e) => ApiError::Internal(e.to_string()),
        }
    }
}
