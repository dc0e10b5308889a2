//! The model registry: the set of model names the scheduler is willing to
//! load, and what it knows about each one (spec §3 "Model Registry").
//!
//! Entries live in the Durable Store's `models` partition so they survive
//! restarts and can be edited at runtime via the admin surface, but the
//! registry is seeded from configuration on first boot — see
//! [`ModelRegistry::bootstrap`].

mod types;

pub use types::ModelInfo;

use std::sync::Arc;
use thiserror::Error;

use crate::config::ModelConfig;
use crate::ledger::Store;

#[derive(Debug, Error)]
pub enum ModelRegistryError {
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),
}

pub type Result<T> = std::result::Result<T, ModelRegistryError>;

/// Read-through cache over the store's `models` partition.
#[derive(Clone)]
pub struct ModelRegistry {
    store: Arc<Store>,
}

impl ModelRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Populate the registry from configured models if the store's
    /// `models` partition is empty — typically the first time the binary
    /// runs against a fresh data directory.
    pub fn bootstrap(&self, configured: &[ModelConfig]) -> Result<()> {
        if !self.store.models_is_empty()? {
            return Ok(());
        }
        for cfg in configured {
            self.store.upsert_model(&ModelInfo::from_config(cfg))?;
        }
        Ok(())
    }

    pub fn lookup(&self, model_name: &str) -> Result<ModelInfo> {
        self.store
            .get_model(model_name)?
            .ok_or_else(|| ModelRegistryError::UnknownModel(model_name.to_string()))
    }

    pub fn is_known(&self, model_name: &str) -> bool {
        matches!(self.store.get_model(model_name), Ok(Some(_)))
    }

    pub fn list(&self) -> Result<Vec<ModelInfo>> {
        Ok(self.store.list_models()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> (ModelRegistry, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("store")).unwrap());
        (ModelRegistry::new(store), dir)
    }

    #[test]
    fn bootstrap_seeds_from_config_once() {
        let (registry, _dir) = registry();
        let configured = vec![ModelConfig {
            name: "gemma-3-4b".to_string(),
            endpoint_url: "http://localhost:11434/v1/chat/completions".to_string(),
            ..Default::default()
        }];

        registry.bootstrap(&configured).unwrap();
        assert!(registry.is_known("gemma-3-4b"));

        // Second bootstrap against a non-empty table is a no-op.
        registry.bootstrap(&[]).unwrap();
        assert!(registry.is_known("gemma-3-4b"));
    }

    #[test]
    fn lookup_unknown_model_errors() {
        let (registry, _dir) = registry();
        assert!(matches!(
            registry.lookup("nope"),
            Err(ModelRegistryError::UnknownModel(_))
        ));
    }
}
