//! Presigned upload endpoints
//!
//! POST /upload/init - mint a job row and a presigned PUT URL
//! POST /upload/complete - verify the object landed, enqueue processing
//! GET /upload/status/{job_id} - poll the job state machine
//!
//! Every query is tenant-scoped; a job owned by another tenant answers
//! 404 so nothing about its existence leaks.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::resolve_context;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{JobStatus, JobType, UploadJob};
use crate::services::object_store::{ObjectStoreClient, ObjectStoreError};
use crate::services::transcriber::normalize_mime_type;
use crate::AppState;

const MAX_FILENAME_LEN: usize = 255;
/// Largest declared upload size accepted at init (500 MB)
const MAX_DECLARED_FILE_SIZE: i64 = 500_000_000;

/// POST /upload/init request
#[derive(Debug, Deserialize)]
pub struct UploadInitRequest {
    pub filename: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    #[serde(default)]
    pub file_size: Option<i64>,
}

fn default_mime_type() -> String {
    "audio/wav".to_string()
}

/// POST /upload/init response.
///
/// `signed_content_type` is baked into the URL signature and must be
/// sent as the Content-Type of the PUT.
#[derive(Debug, Serialize)]
pub struct UploadInitResponse {
    pub upload_url: String,
    pub file_key: String,
    pub job_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub signed_content_type: String,
}

/// POST /upload/complete request
#[derive(Debug, Deserialize)]
pub struct UploadCompleteRequest {
    pub file_key: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// POST /upload/complete response
#[derive(Debug, Serialize)]
pub struct UploadCompleteResponse {
    pub job_id: Uuid,
    pub interaction_id: Uuid,
    pub status: JobStatus,
}

/// GET /upload/status/{job_id} response
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub interaction_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_summary: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

impl From<&UploadJob> for JobStatusResponse {
    fn from(job: &UploadJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            interaction_id: job.interaction_id,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            result_summary: job.result_summary.clone(),
            error_message: job.error_message.clone(),
            error_code: job.error_code.clone(),
        }
    }
}

/// POST /upload/init
pub async fn upload_init(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UploadInitRequest>,
) -> ApiResult<Json<UploadInitResponse>> {
    let context = resolve_context(&headers, &state.config)?;

    if request.filename.is_empty() || request.filename.len() > MAX_FILENAME_LEN {
        return Err(ApiError::validation(
            "VALIDATION_MISSING_FIELD",
            format!("filename must be 1-{MAX_FILENAME_LEN} characters"),
        ));
    }
    if let Some(size) = request.file_size {
        if !(1..=MAX_DECLARED_FILE_SIZE).contains(&size) {
            return Err(ApiError::validation(
                "VALIDATION_TOO_LARGE",
                format!(
                    "file_size must be between 1 and {} bytes",
                    MAX_DECLARED_FILE_SIZE
                ),
            ));
        }
    }

    let job_id = Uuid::new_v4();
    let mime_type = normalize_mime_type(&request.mime_type);

    // Input validation runs before the store is consulted
    let file_key = ObjectStoreClient::generate_file_key(context.tenant_id, job_id, &request.filename)
        .map_err(|err| match err {
            ObjectStoreError::InvalidFilename(message) => {
                ApiError::validation("VALIDATION_MISSING_FIELD", message)
            }
            other => ApiError::internal("STORAGE_UNAVAILABLE", other.to_string()),
        })?;

    let store = state
        .object_store
        .as_ref()
        .ok_or_else(|| ApiError::internal("STORAGE_UNAVAILABLE", "object store not configured"))?;

    let (upload_url, expires_at) = store.presigned_put_url(&file_key, &mime_type);

    let now = Utc::now();
    let job = UploadJob {
        id: job_id,
        tenant_id: context.tenant_id,
        user_id: context.user_id.clone(),
        pg_user_id: context.pg_user_id.clone(),
        user_name: context.user_name.clone(),
        job_type: JobType::AudioTranscription,
        status: JobStatus::Queued,
        file_key: file_key.clone(),
        file_name: Some(request.filename.clone()),
        mime_type: Some(mime_type.clone()),
        file_size: request.file_size,
        interaction_id: context.interaction_id,
        trace_id: Some(context.trace_id.to_string()),
        account_id: context.account_id.clone(),
        error_message: None,
        error_code: None,
        result_summary: None,
        metadata_json: None,
        created_at: now,
        updated_at: now,
        started_at: None,
        completed_at: None,
    };

    db::jobs::insert_job(&state.db, &job).await?;

    info!(
        job_id = %job_id,
        interaction_id = %context.interaction_id,
        tenant_id = %context.tenant_id,
        filename = %request.filename,
        mime_type = %mime_type,
        "Upload job created"
    );

    Ok(Json(UploadInitResponse {
        upload_url,
        file_key,
        job_id,
        expires_at,
        signed_content_type: mime_type,
    }))
}

/// POST /upload/complete
pub async fn upload_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UploadCompleteRequest>,
) -> ApiResult<Json<UploadCompleteResponse>> {
    let context = resolve_context(&headers, &state.config)?;

    // Cross-tenant keys read as absent: the tenant-scoped lookup below
    // cannot see them, and the prefix check avoids a pointless HEAD.
    if !ObjectStoreClient::key_belongs_to_tenant(&request.file_key, context.tenant_id) {
        warn!(
            tenant_id = %context.tenant_id,
            "Upload complete for key outside tenant prefix"
        );
        return Err(ApiError::NotFound("Job not found".to_string()));
    }

    let job = db::jobs::find_for_tenant_by_key(&state.db, context.tenant_id, &request.file_key)
        .await?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;

    // Verify the object actually landed before queueing work
    if let Some(store) = &state.object_store {
        let exists = store
            .object_exists(&job.file_key)
            .await
            .map_err(|err| ApiError::internal("STORAGE_UNAVAILABLE", err.to_string()))?;
        if !exists {
            return Err(ApiError::NotFound("File not found in storage".to_string()));
        }
    }

    // Idempotent return for requests that raced the worker
    if matches!(job.status, JobStatus::Processing | JobStatus::Succeeded) {
        info!(job_id = %job.id, status = job.status.as_str(), "Idempotent complete");
        return Ok(Json(UploadCompleteResponse {
            job_id: job.id,
            interaction_id: job.interaction_id,
            status: job.status,
        }));
    }

    // A failed job may be retried; reset it to queued
    if job.status == JobStatus::Failed {
        info!(job_id = %job.id, "Retrying failed job");
        db::jobs::requeue_failed(&state.db, job.id).await?;
    }

    let normalized_mime = request.mime_type.as_deref().map(normalize_mime_type);
    let metadata_json = request
        .metadata
        .as_ref()
        .and_then(|map| serde_json::to_string(map).ok());
    db::jobs::update_upload_metadata(
        &state.db,
        job.id,
        request.file_name.as_deref(),
        normalized_mime.as_deref(),
        request.file_size,
        metadata_json.as_deref(),
    )
    .await?;

    let worker = state.worker.clone();
    let job_id = job.id;
    tokio::spawn(async move {
        worker.process(job_id).await;
    });

    info!(job_id = %job.id, "Processing triggered");

    Ok(Json(UploadCompleteResponse {
        job_id: job.id,
        interaction_id: job.interaction_id,
        status: JobStatus::Queued,
    }))
}

/// GET /upload/status/{job_id}
pub async fn upload_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let context = resolve_context(&headers, &state.config)?;

    let job_id = Uuid::parse_str(&job_id).map_err(|_| {
        ApiError::validation("VALIDATION_INVALID_UUID", "Invalid job ID format")
    })?;

    let job = db::jobs::find_for_tenant(&state.db, job_id, context.tenant_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;

    Ok(Json(JobStatusResponse::from(&job)))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/upload/init", post(upload_init))
        .route("/upload/complete", post(upload_complete))
        .route("/upload/status/:job_id", get(upload_status))
}
