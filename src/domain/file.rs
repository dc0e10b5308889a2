use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Purpose of an uploaded or generated file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilePurpose {
    Input,
    Output,
    Error,
}

/// A blob tracked by the control plane. The bytes themselves live in the
/// file-content store (`crate::storage`); this is the metadata record kept
/// in the durable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: String,
    pub purpose: FilePurpose,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Opaque handle into the blob store (object key).
    pub storage_key: String,
}

impl File {
    pub fn new(purpose: FilePurpose, size_bytes: u64, storage_key: String) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            purpose,
            size_bytes,
            created_at: Utc::now(),
            storage_key,
        }
    }
}
