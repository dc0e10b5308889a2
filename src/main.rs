mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use batchd::admission::AdmissionController;
use batchd::api;
use batchd::config::Config;
use batchd::gpu::{GpuProbe, SysfsGpuProbe};
use batchd::handlers::HandlerRegistry;
use batchd::inference::http::{HttpAdapterConfig, HttpInferenceAdapter};
use batchd::inference::stub::StubInferenceAdapter;
use batchd::inference::InferenceAdapter;
use batchd::ledger::Store;
use batchd::model_registry::ModelRegistry;
use batchd::observability::Metrics;
use batchd::scheduler::{heartbeat, Scheduler};
use batchd::storage::StorageClient;
use batchd::webhook::Dispatcher;

use cli::{Cli, Commands};

const WEBHOOK_DRAIN_INTERVAL: Duration = Duration::from_secs(5);
/// Drain the dead-letter/terminal job pruning sweep once per this many
/// webhook-drain ticks, rather than on its own task (spec's task topology
/// names exactly four cooperating tasks; retention piggybacks on the
/// lowest-frequency one of them).
const PRUNE_EVERY_N_DRAINS: u32 = 120;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

struct Components {
    config: Arc<Config>,
    store: Arc<Store>,
    storage: StorageClient,
    model_registry: ModelRegistry,
    registry: Arc<HandlerRegistry>,
    gpu_probe: Arc<dyn GpuProbe>,
    admission: Arc<AdmissionController>,
    webhook: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
    worker_id: String,
}

fn build_components() -> Result<Components, AnyError> {
    let config = Config::load().map_err(|e| format!("failed to load configuration: {e}"))?;

    let store = Arc::new(
        Store::open(&config.server.store_path)
            .map_err(|e| format!("failed to open durable store: {e}"))?,
    );

    let storage = match config.storage.provider {
        batchd::config::StorageProvider::Local => StorageClient::in_memory(),
        batchd::config::StorageProvider::S3 => StorageClient::in_memory(),
    };

    let model_registry = ModelRegistry::new(store.clone());
    model_registry
        .bootstrap(&config.models)
        .map_err(|e| format!("failed to bootstrap model registry: {e}"))?;

    let registry = Arc::new(HandlerRegistry::with_defaults());
    let gpu_probe: Arc<dyn GpuProbe> = Arc::new(SysfsGpuProbe::new());
    let metrics = Arc::new(Metrics::new());

    let admission = Arc::new(AdmissionController::new(
        store.clone(),
        storage.clone(),
        model_registry.clone(),
        registry.clone(),
        gpu_probe.clone(),
        config.scheduler.clone(),
    ));

    let webhook = Arc::new(Dispatcher::new(
        store.clone(),
        config.webhook.clone(),
        metrics.clone(),
    ));

    let worker_id = std::env::var("BATCH_WORKER_ID").unwrap_or_else(|_| "worker-1".to_string());

    Ok(Components {
        config: Arc::new(config),
        store,
        storage,
        model_registry,
        registry,
        gpu_probe,
        admission,
        webhook,
        metrics,
        worker_id,
    })
}

/// Picks the inference adapter: an HTTP adapter pointed at the first
/// configured model's endpoint (the way Ollama/vLLM serve every model off
/// one OpenAI-compatible endpoint, distinguished by the `model` field in
/// the request body), or the deterministic stub when no model is
/// configured yet.
fn build_inference_adapter(config: &Config) -> Arc<dyn InferenceAdapter> {
    match config.models.first() {
        Some(model) => Arc::new(HttpInferenceAdapter::new(
            model.endpoint_url.clone(),
            HttpAdapterConfig::default(),
        )),
        None => {
            info!("no models configured; using the stub inference adapter");
            Arc::new(StubInferenceAdapter::new())
        }
    }
}

fn build_scheduler(components: &Components, inference: Arc<dyn InferenceAdapter>) -> Scheduler {
    Scheduler::new(
        components.store.clone(),
        components.storage.clone(),
        components.model_registry.clone(),
        components.registry.clone(),
        inference,
        components.gpu_probe.clone(),
        components.webhook.clone(),
        components.metrics.clone(),
        components.config.scheduler.clone(),
        components.worker_id.clone(),
    )
}

async fn run_scheduler_task(scheduler: Scheduler) {
    if let Err(err) = scheduler.recover_on_startup().await {
        error!(error = %err, "scheduler crash-recovery failed");
    }
    scheduler.run().await;
}

async fn run_webhook_drain_task(webhook: Arc<Dispatcher>, store: Arc<Store>, retention_days: u32) {
    let mut interval = tokio::time::interval(WEBHOOK_DRAIN_INTERVAL);
    let mut ticks: u32 = 0;
    loop {
        interval.tick().await;
        if let Err(err) = webhook.run_once().await {
            error!(error = %err, "webhook drain sweep failed");
        }

        ticks += 1;
        if ticks % PRUNE_EVERY_N_DRAINS == 0 {
            let older_than = chrono::Duration::days(retention_days as i64);
            match store.prune_terminal_jobs(older_than) {
                Ok(stats) => info!(pruned = stats.jobs_pruned, "pruned terminal jobs"),
                Err(err) => error!(error = %err, "terminal job pruning failed"),
            }
        }
    }
}

async fn serve(components: Components) -> Result<(), AnyError> {
    let inference = build_inference_adapter(&components.config);
    let scheduler = build_scheduler(&components, inference);

    let heartbeat_store = components.store.clone();
    let heartbeat_worker_id = components.worker_id.clone();
    let heartbeat_period = Duration::from_secs(components.config.scheduler.heartbeat_period_secs);

    let webhook = components.webhook.clone();
    let webhook_store = components.store.clone();
    let retention_days = components.config.retention.retention_days;

    let state = api::state::AppState::new(
        (*components.config).clone(),
        (*components.registry).clone(),
        components.store.clone(),
        components.storage.clone(),
        components.model_registry.clone(),
        components.admission.clone(),
        components.webhook.clone(),
        components.metrics.clone(),
        components.gpu_probe.clone(),
        components.worker_id.clone(),
    );
    let bind_addr = components.config.server.bind_addr;

    tokio::spawn(run_scheduler_task(scheduler));
    tokio::spawn(heartbeat::run(
        heartbeat_store,
        heartbeat_worker_id,
        heartbeat_period,
    ));
    tokio::spawn(run_webhook_drain_task(webhook, webhook_store, retention_days));

    api::run(bind_addr, state).await
}

async fn run_scheduler_only(components: Components) -> Result<(), AnyError> {
    let inference = build_inference_adapter(&components.config);
    let scheduler = build_scheduler(&components, inference);

    let heartbeat_store = components.store.clone();
    let heartbeat_worker_id = components.worker_id.clone();
    let heartbeat_period = Duration::from_secs(components.config.scheduler.heartbeat_period_secs);

    let webhook = components.webhook.clone();
    let webhook_store = components.store.clone();
    let retention_days = components.config.retention.retention_days;

    let heartbeat_task = tokio::spawn(heartbeat::run(
        heartbeat_store,
        heartbeat_worker_id,
        heartbeat_period,
    ));
    let webhook_task = tokio::spawn(run_webhook_drain_task(
        webhook,
        webhook_store,
        retention_days,
    ));

    run_scheduler_task(scheduler).await;

    heartbeat_task.abort();
    webhook_task.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let components = build_components()?;

    match cli.command {
        Commands::Serve => serve(components).await?,
        Commands::Scheduler => run_scheduler_only(components).await?,
    }

    Ok(())
}
