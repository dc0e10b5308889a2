use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use super::chat_completions::ChatCompletionsHandler;
use super::traits::EndpointHandler;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no handler registered for endpoint: {0}")]
    NotFound(String),
}

/// Maps an API endpoint path (as it appears on `BatchRequestLine.url` and
/// `Job.endpoint`) to the capability set that knows how to parse, validate,
/// and render its lines.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn EndpointHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, endpoint: impl Into<String>, handler: Arc<dyn EndpointHandler>) {
        self.handlers.insert(endpoint.into(), handler);
    }

    pub fn get(&self, endpoint: &str) -> Result<Arc<dyn EndpointHandler>, RegistryError> {
        self.handlers
            .get(endpoint)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(endpoint.to_string()))
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            "/v1/chat/completions",
            Arc::new(ChatCompletionsHandler::new()),
        );
        registry
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_knows_chat_completions() {
        let registry = HandlerRegistry::with_defaults();
        assert!(registry.get("/v1/chat/completions").is_ok());
    }

    #[test]
    fn unknown_endpoint_errors() {
        let registry = HandlerRegistry::with_defaults();
        assert!(matches!(
            registry.get("/v1/embeddings"),
            Err(RegistryError::NotFound(_))
        ));
    }
}
