use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
    #[error(transparent)]
    ModelRegistry(#[from] crate::model_registry::ModelRegistryError),
    #[error(transparent)]
    Webhook(#[from] crate::webhook::WebhookError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
