//! HTTP handlers for the OpenAI-compatible batch surface (spec §6.1).
//!
//! Each handler is a thin translation layer: extract the request, call into
//! `AdmissionController`, `Store`, or `StorageClient`, and shape the result
//! as the DTOs in [`super::models`]. No business logic lives here — the
//! invariants (queue admission, GPU health, cancellation semantics) are
//! owned by the components these handlers call.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use tracing::warn;

use super::models::{
    Batch, CreateBatchRequest, FileResponse, GpuHealth, HealthResponse, ListBatchesQuery,
    ListBatchesResponse, ModelSummary, ModelsResponse, QueueHealth, WorkerHealth,
    parse_status_filter,
};
use super::state::AppState;
use crate::admission::SubmitRequest;
use crate::api::error::ApiError;
use crate::domain::{File, FilePurpose, JobStatus};
use crate::ledger::LedgerError;

/// `POST /v1/files`: accepts a multipart upload with a `file` part and a
/// `purpose` part. Only `purpose=input` is accepted from clients — output
/// and error files are created exclusively by the scheduler.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut bytes: Option<Vec<u8>> = None;
    let mut purpose: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidRequest(format!("failed to read file part: {e}")))?;
                bytes = Some(data.to_vec());
            }
            "purpose" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidRequest(format!("failed to read purpose part: {e}")))?;
                purpose = Some(text);
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| ApiError::InvalidRequest("missing file part".to_string()))?;
    let purpose = purpose.unwrap_or_else(|| "input".to_string());
    if purpose != "input" {
        return Err(ApiError::InvalidRequest(
            "only purpose=input may be uploaded by clients".to_string(),
        ));
    }

    let max_size = state.config.server.api.max_payload_bytes.as_u64();
    super::utils::validate_body_size(&bytes, max_size)?;

    let file = File::new(FilePurpose::Input, bytes.len() as u64, String::new());
    let storage_key = format!("files/{}/content.jsonl", file.id);
    state
        .storage
        .upload(&storage_key, bytes)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let file = File {
        storage_key,
        ..file
    };
    state.store.upsert_file(&file)?;

    Ok((StatusCode::OK, Json(FileResponse::from(&file))))
}

/// `GET /v1/files/{file_id}/content`: streams the raw bytes of a file back
/// to the client (used both for input echo-back and for reading results).
pub async fn get_file_content(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let file = state
        .store
        .get_file(&file_id)?
        .ok_or_else(|| ApiError::NotFound(format!("file {file_id}")))?;

    let bytes = state
        .storage
        .download(&file.storage_key)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/jsonl")],
        bytes,
    ))
}

/// `POST /v1/batches`: runs the full admission pipeline (spec §4.1) and
/// returns the created batch.
pub async fn create_batch(
    State(state): State<AppState>,
    Json(body): Json<CreateBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let req = SubmitRequest {
        input_file_id: body.input_file_id,
        model_name: body.model,
        endpoint: body.endpoint,
        completion_window: body.completion_window.map(ChronoDuration::seconds),
        metadata: body.metadata,
        webhook_url: body.webhook_url,
        webhook_secret: body.webhook_secret,
        priority: body.priority,
    };

    let job = state.admission.submit(req).await?;
    state.metrics.job_accepted();

    Ok((StatusCode::OK, Json(Batch::from(&job))))
}

/// `GET /v1/batches/{id}`.
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .store
        .get_job(&batch_id)?
        .ok_or_else(|| ApiError::NotFound(format!("batch {batch_id}")))?;

    Ok((StatusCode::OK, Json(Batch::from(&job))))
}

/// `GET /v1/batches`: filter by `status`, paginate with `limit`/`offset`.
/// Sorted by creation time, newest first, matching the OpenAI list
/// semantics this surface mirrors.
pub async fn list_batches(
    State(state): State<AppState>,
    Query(query): Query<ListBatchesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status_filter = match &query.status {
        Some(raw) => Some(
            parse_status_filter(raw)
                .ok_or_else(|| ApiError::InvalidRequest(format!("unknown status: {raw}")))?,
        ),
        None => None,
    };

    let mut jobs = state.store.list_jobs()?;
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    if let Some(status) = status_filter {
        jobs.retain(|job| job.status == status);
    }

    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(20).min(1000);
    let total = jobs.len();
    let page: Vec<Batch> = jobs
        .iter()
        .skip(offset)
        .take(limit)
        .map(Batch::from)
        .collect();
    let has_more = offset + page.len() < total;

    Ok((
        StatusCode::OK,
        Json(ListBatchesResponse {
            object: "list",
            data: page,
            has_more,
        }),
    ))
}

/// `DELETE /v1/batches/{id}`: cancel per spec §4.5 — a job still
/// `Validating` is cancelled immediately; a job `InProgress` is marked
/// `cancel_requested` and transitions to `Cancelling`, with the scheduler
/// completing the transition to `Cancelled` at the next chunk boundary.
/// Any other status is not a valid transition.
pub async fn cancel_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut cancelled_immediately = false;
    let job = state
        .store
        .cas_job(&batch_id, |mut job| {
            match job.status {
                JobStatus::Validating => {
                    job.status = JobStatus::Cancelled;
                    job.finished_at = Some(Utc::now());
                    cancelled_immediately = true;
                }
                JobStatus::InProgress => {
                    job.cancel_requested = true;
                    job.status = JobStatus::Cancelling;
                }
                other => {
                    return Err(LedgerError::InvalidTransition(format!(
                        "cannot cancel batch in status {}",
                        other.as_str()
                    )));
                }
            }
            Ok(job)
        })
        .await?;

    if cancelled_immediately {
        state.webhook.enqueue_for_job(&job)?;
    }

    state.metrics.job_cancelled();
    Ok((StatusCode::OK, Json(Batch::from(&job))))
}

/// `GET /v1/batches/{id}/results`: the output file's bytes, if any exist
/// yet. A job with no completed chunks has no output file and this 404s,
/// matching the "nothing to read" case rather than returning an empty body.
pub async fn get_batch_results(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .store
        .get_job(&batch_id)?
        .ok_or_else(|| ApiError::NotFound(format!("batch {batch_id}")))?;

    let output_file_id = job
        .output_file_id
        .ok_or_else(|| ApiError::NotFound(format!("batch {batch_id} has no output file yet")))?;

    let file = state
        .store
        .get_file(&output_file_id)?
        .ok_or_else(|| ApiError::NotFound(format!("file {output_file_id}")))?;

    let bytes = state
        .storage
        .download(&file.storage_key)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/jsonl")],
        bytes,
    ))
}

/// `GET /v1/batches/{id}/errors`: the per-request error file, if the job
/// produced one.
pub async fn get_batch_errors(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .store
        .get_job(&batch_id)?
        .ok_or_else(|| ApiError::NotFound(format!("batch {batch_id}")))?;

    let error_file_id = job
        .error_file_id
        .ok_or_else(|| ApiError::NotFound(format!("batch {batch_id} has no error file")))?;

    let file = state
        .store
        .get_file(&error_file_id)?
        .ok_or_else(|| ApiError::NotFound(format!("file {error_file_id}")))?;

    let bytes = state
        .storage
        .download(&file.storage_key)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/jsonl")],
        bytes,
    ))
}

/// `GET /v1/models`: the models configured and bootstrapped at startup.
pub async fn list_models(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let models = state.model_registry.list()?;
    let data: Vec<ModelSummary> = models.iter().map(ModelSummary::from).collect();

    Ok((StatusCode::OK, Json(ModelsResponse { object: "list", data })))
}

/// `GET /v1/health`: a composite of a fresh GPU probe, the last-written
/// worker heartbeat, and the current non-terminal queue depth.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let reading = state.gpu_probe.probe().await;
    let gpu = GpuHealth {
        memory_fraction: reading.memory_fraction(),
        temperature_c: reading.temperature_c(),
    };

    let heartbeat = match state.store.get_heartbeat(&state.worker_id) {
        Ok(hb) => hb,
        Err(e) => {
            warn!(error = %e, "failed to read worker heartbeat for health check");
            None
        }
    };

    let dead_threshold = ChronoDuration::seconds(
        state.config.scheduler.heartbeat_dead_threshold_secs as i64,
    );
    let worker = match &heartbeat {
        Some(hb) => WorkerHealth {
            status: hb.status.as_str(),
            current_job_id: hb.current_job_id.clone(),
            loaded_model_name: hb.loaded_model_name.clone(),
            last_seen_at: Some(hb.last_seen_at.timestamp()),
            alive: !hb.is_dead(Utc::now(), dead_threshold),
        },
        None => WorkerHealth {
            status: "unknown",
            current_job_id: None,
            loaded_model_name: None,
            last_seen_at: None,
            alive: false,
        },
    };

    let non_terminal_jobs = match state.store.list_jobs() {
        Ok(jobs) => jobs.iter().filter(|j| !j.status.is_terminal()).count(),
        Err(e) => {
            warn!(error = %e, "failed to list jobs for health check");
            0
        }
    };

    let queue = QueueHealth {
        non_terminal_jobs,
        max_queue_depth: state.config.scheduler.max_queue_depth,
    };

    let status = if worker.alive { "healthy" } else { "degraded" };
    let status_code = if worker.alive {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            gpu,
            worker,
            queue,
        }),
    )
}
