use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::config::Config;
use crate::gpu::GpuProbe;
use crate::handlers::HandlerRegistry;
use crate::ledger::Store;
use crate::model_registry::ModelRegistry;
use crate::observability::Metrics;
use crate::storage::StorageClient;
use crate::webhook::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<HandlerRegistry>,
    pub store: Arc<Store>,
    pub storage: StorageClient,
    pub model_registry: ModelRegistry,
    pub admission: Arc<AdmissionController>,
    pub webhook: Arc<Dispatcher>,
    pub metrics: Arc<Metrics>,
    pub gpu_probe: Arc<dyn GpuProbe>,
    pub worker_id: String,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        registry: HandlerRegistry,
        store: Arc<Store>,
        storage: StorageClient,
        model_registry: ModelRegistry,
        admission: Arc<AdmissionController>,
        webhook: Arc<Dispatcher>,
        metrics: Arc<Metrics>,
        gpu_probe: Arc<dyn GpuProbe>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            store,
            storage,
            model_registry,
            admission,
            webhook,
            metrics,
            gpu_probe,
            worker_id: worker_id.into(),
        }
    }
}
