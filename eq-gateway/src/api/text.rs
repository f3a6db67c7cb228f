//! Text cleaning endpoint
//!
//! POST /text/clean - raw text in (notes, legacy documents), cleaned
//! text out, with the envelope and intelligence lanes forked after
//! cleaning.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use eq_common::envelope::{Content, ContentFormat, EnvelopeV1, EventSource, InteractionType};

use crate::auth::resolve_context;
use crate::error::{ApiError, ApiResult};
use crate::services::intelligence::DEFAULT_PERSONA_CODE;
use crate::services::orchestrator::run_fork;
use crate::AppState;

/// POST /text/clean request
#[derive(Debug, Deserialize)]
pub struct TextCleanRequest {
    pub text: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub source: Option<EventSource>,
}

/// POST /text/clean response
#[derive(Debug, Serialize)]
pub struct TextCleanResponse {
    pub raw_text: String,
    pub cleaned_text: String,
    pub interaction_id: Uuid,
}

/// POST /text/clean
pub async fn clean_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TextCleanRequest>,
) -> ApiResult<Json<TextCleanResponse>> {
    let context = resolve_context(&headers, &state.config)?;

    if request.text.trim().is_empty() {
        return Err(ApiError::validation(
            "VALIDATION_EMPTY_TEXT",
            "text field cannot contain only whitespace",
        ));
    }

    info!(
        interaction_id = %context.interaction_id,
        tenant_id = %context.tenant_id,
        text_length = request.text.len(),
        "Text cleaning started"
    );

    let cleaned_text = state.cleaner.clean_transcript(&request.text).await;

    // extras: shallow copy of caller metadata, plus user_name when known
    // (the key is absent when null, never an empty value)
    let mut extras = request.metadata.clone().unwrap_or_default();
    if let Some(user_name) = &context.user_name {
        extras.insert("user_name".to_string(), Value::String(user_name.clone()));
    }

    let envelope = EnvelopeV1::new(
        context.tenant_id,
        context.user_id.clone(),
        InteractionType::Note,
        Content {
            text: cleaned_text.clone(),
            format: ContentFormat::Plain,
        },
        request.source.unwrap_or_default(),
        extras,
        context.interaction_id,
        context.trace_id.to_string(),
        context.account_id.clone(),
    );

    let publisher = state.publisher.clone();
    let publish_envelope = envelope.clone();
    let intelligence = state.intelligence.clone();
    let lane_text = cleaned_text.clone();
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
                    &lane_text,
                    lane_context.interaction_id,
                    lane_context.tenant_id,
                    lane_context.trace_id,
                    InteractionType::Note.as_str(),
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
        cleaned_length = cleaned_text.len(),
        "Text cleaning request complete"
    );

    Ok(Json(TextCleanResponse {
        raw_text: request.text,
        cleaned_text,
        interaction_id: context.interaction_id,
    }))
}

/// Build text routes
pub fn text_routes() -> Router<AppState> {
    Router::new().route("/text/clean", post(clean_text))
}
