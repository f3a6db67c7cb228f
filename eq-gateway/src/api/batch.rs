//! Synchronous audio upload endpoint
//!
//! POST /batch/process (multipart) - one audio file in, raw and cleaned
//! transcripts out. Format and size are validated before the bytes are
//! accepted: the extension gate runs on the filename alone, and the
//! body is read in chunks against the size cap so an oversized upload is
//! rejected without buffering the whole payload.

use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Map;
use tracing::{info, warn};
use uuid::Uuid;

use eq_common::envelope::{Content, ContentFormat, EnvelopeV1, EventSource, InteractionType};

use crate::auth::resolve_context;
use crate::error::{ApiError, ApiResult};
use crate::services::intelligence::DEFAULT_PERSONA_CODE;
use crate::services::orchestrator::run_fork;
use crate::services::transcriber::mime_type_for_extension;
use crate::AppState;

/// Maximum accepted upload size
const MAX_FILE_SIZE: usize = 100 * 1024 * 1024;

/// POST /batch/process response
#[derive(Debug, Serialize)]
pub struct BatchProcessResponse {
    pub raw_transcript: String,
    pub cleaned_transcript: String,
    pub interaction_id: Uuid,
}

/// POST /batch/process
pub async fn process_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Json<BatchProcessResponse>> {
    let context = resolve_context(&headers, &state.config)?;

    // Find the file field and read it within one pass; the extension
    // gate runs before any bytes are accepted, and the body streams
    // against the size cap instead of buffering blindly.
    let mut file: Option<(String, &'static str, Vec<u8>)> = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::validation("VALIDATION_MISSING_FIELD", err.to_string()))?
    {
        let filename = match field.file_name().filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => continue,
        };

        let extension = filename.rsplit('.').next().unwrap_or("").to_lowercase();
        let mime_type = mime_type_for_extension(&extension).ok_or_else(|| {
            warn!(
                interaction_id = %context.interaction_id,
                extension = %extension,
                "Unsupported file format rejected"
            );
            ApiError::validation(
                "VALIDATION_UNSUPPORTED_FORMAT",
                format!("Unsupported file format: .{extension}"),
            )
        })?;

        let mut audio_bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|err| ApiError::validation("VALIDATION_MISSING_FIELD", err.to_string()))?
        {
            if audio_bytes.len() + chunk.len() > MAX_FILE_SIZE {
                warn!(
                    interaction_id = %context.interaction_id,
                    "Upload exceeded size limit"
                );
                return Err(ApiError::validation(
                    "VALIDATION_TOO_LARGE",
                    format!(
                        "File too large. Maximum size: {}MB",
                        MAX_FILE_SIZE / (1024 * 1024)
                    ),
                ));
            }
            audio_bytes.extend_from_slice(&chunk);
        }

        file = Some((filename, mime_type, audio_bytes));
        break;
    }

    let (filename, mime_type, audio_bytes) = file.ok_or_else(|| {
        ApiError::validation("VALIDATION_MISSING_FIELD", "No file provided")
    })?;
    let extension = filename.rsplit('.').next().unwrap_or("").to_lowercase();

    info!(
        interaction_id = %context.interaction_id,
        tenant_id = %context.tenant_id,
        size = audio_bytes.len(),
        extension = %extension,
        "Batch processing started"
    );

    let (raw_transcript, _metadata) = state
        .transcriber
        .transcribe_bytes(audio_bytes, mime_type)
        .await
        .map_err(|err| ApiError::internal("TRANSCRIPTION_FAILED", err.to_string()))?;

    let cleaned_transcript = state.cleaner.clean_transcript(&raw_transcript).await;

    let envelope = EnvelopeV1::new(
        context.tenant_id,
        context.user_id.clone(),
        InteractionType::BatchUpload,
        Content {
            text: cleaned_transcript.clone(),
            format: ContentFormat::Diarized,
        },
        EventSource::Upload,
        Map::new(),
        context.interaction_id,
        context.trace_id.to_string(),
        context.account_id.clone(),
    );

    let publisher = state.publisher.clone();
    let publish_envelope = envelope.clone();
    let intelligence = state.intelligence.clone();
    let lane_transcript = cleaned_transcript.clone();
    let lane_context = context.clone();

    run_fork(
        context.interaction_id,
        async move {
            publisher.publish_envelope(&publish_envelope).await;
            Ok(())
        },
        async move {
            intelligence
                .process_transcript(
                    &lane_transcript,
                    lane_context.interaction_id,
                    lane_context.tenant_id,
                    lane_context.trace_id,
                    InteractionType::BatchUpload.as_str(),
                    lane_context.account_id.as_deref(),
                    None,
                    DEFAULT_PERSONA_CODE,
                )
                .await;
            Ok(())
        },
    )
    .await;

    info!(
        interaction_id = %context.interaction_id,
        raw_length = raw_transcript.len(),
        cleaned_length = cleaned_transcript.len(),
        "Batch processing complete"
    );

    Ok(Json(BatchProcessResponse {
        raw_transcript,
        cleaned_transcript,
        interaction_id: context.interaction_id,
    }))
}

/// Build batch routes
pub fn batch_routes() -> Router<AppState> {
    Router::new().route("/batch/process", post(process_batch))
}
