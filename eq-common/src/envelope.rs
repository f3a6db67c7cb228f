//! EnvelopeV1 - the versioned event schema shared by every downstream consumer
//!
//! Every completed pipeline run is handed off as exactly one `EnvelopeV1`,
//! serialized once per publish. The schema has a strict core (identity,
//! content, timestamp) and a flexible edge (`extras`) that must survive
//! unknown keys added by future callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Current envelope schema version
pub const SCHEMA_VERSION: &str = "v1";

/// Kind of artifact an envelope describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Transcript,
    Note,
    Meeting,
    BatchUpload,
    Document,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Transcript => "transcript",
            InteractionType::Note => "note",
            InteractionType::Meeting => "meeting",
            InteractionType::BatchUpload => "batch_upload",
            InteractionType::Document => "document",
        }
    }
}

/// Content format of the envelope payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFormat {
    Plain,
    Markdown,
    Diarized,
}

impl Default for ContentFormat {
    fn default() -> Self {
        ContentFormat::Plain
    }
}

/// Origin of the content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    WebMic,
    Upload,
    Api,
    Websocket,
    Import,
}

impl Default for EventSource {
    fn default() -> Self {
        EventSource::Api
    }
}

/// The actual content payload carried by an envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub text: String,
    #[serde(default)]
    pub format: ContentFormat,
}

/// Standardized event envelope for all ecosystem events (version 1)
///
/// Timestamps serialize as RFC 3339 with a `Z` suffix; UUIDs serialize as
/// canonical hyphenated lowercase strings. `serialize` then `deserialize`
/// yields an equivalent value for every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeV1 {
    pub schema_version: String,

    // Strict core - identity
    pub tenant_id: Uuid,
    /// Opaque user identifier (supports provider-prefixed forms)
    pub user_id: String,

    // Strict core - content
    pub interaction_type: InteractionType,
    pub content: Content,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,

    // Flexible edge - open map, unknown keys survive
    #[serde(default)]
    pub extras: Map<String, Value>,

    // Processing metadata
    pub interaction_id: Uuid,
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl EnvelopeV1 {
    /// Build an envelope stamped with the current schema version and time
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: Uuid,
        user_id: String,
        interaction_type: InteractionType,
        content: Content,
        source: EventSource,
        extras: Map<String, Value>,
        interaction_id: Uuid,
        trace_id: String,
        account_id: Option<String>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            tenant_id,
            user_id,
            interaction_type,
            content,
            timestamp: Utc::now(),
            source,
            extras,
            interaction_id,
            trace_id,
            account_id,
        }
    }
}
