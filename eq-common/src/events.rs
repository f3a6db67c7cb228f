//! Record wrappers for the stream and event-bus destinations
//!
//! The stream record duplicates routing fields at the top level so
//! consumers can route without parsing the full envelope. The bus entry
//! matches the PutEvents wire shape exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::EnvelopeV1;

/// Wrapper for stream records: `{envelope, trace_id, tenant_id, schema_version}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub envelope: EnvelopeV1,
    pub trace_id: String,
    pub tenant_id: String,
    pub schema_version: String,
}

impl StreamRecord {
    /// Wrap an envelope, mirroring routing fields at the top level
    pub fn wrap(envelope: EnvelopeV1) -> Self {
        Self {
            trace_id: envelope.trace_id.clone(),
            tenant_id: envelope.tenant_id.to_string(),
            schema_version: envelope.schema_version.clone(),
            envelope,
        }
    }

    /// Partition key for the stream: the tenant UUID as a string
    pub fn partition_key(&self) -> &str {
        &self.tenant_id
    }
}

/// Entry shape for the event bus (`PutEvents`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEntry {
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "DetailType")]
    pub detail_type: String,
    #[serde(rename = "Detail")]
    pub detail: String,
    #[serde(rename = "EventBusName")]
    pub event_bus_name: String,
}

/// Lightweight per-segment telemetry event emitted by live sessions
///
/// This is a live-only path: the full envelope is published once at
/// session close, not per segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegmentEvent {
    pub event_type: String,
    pub transcript: String,
    pub session_id: Uuid,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptSegmentEvent {
    pub fn new(transcript: String, session_id: Uuid, tenant_id: String) -> Self {
        Self {
            event_type: "transcript_completed".to_string(),
            transcript,
            session_id,
            tenant_id,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Content, ContentFormat, EventSource, InteractionType};
    use serde_json::Map;

    fn sample_envelope() -> EnvelopeV1 {
        EnvelopeV1::new(
            Uuid::new_v4(),
            "user-1".to_string(),
            InteractionType::Note,
            Content {
                text: "hello".to_string(),
                format: ContentFormat::Plain,
            },
            EventSource::Api,
            Map::new(),
            Uuid::new_v4(),
            Uuid::new_v4().to_string(),
            None,
        )
    }

    #[test]
    fn stream_record_mirrors_routing_fields() {
        let envelope = sample_envelope();
        let tenant = envelope.tenant_id;
        let trace = envelope.trace_id.clone();
        let record = StreamRecord::wrap(envelope);

        assert_eq!(record.tenant_id, tenant.to_string());
        assert_eq!(record.trace_id, trace);
        assert_eq!(record.schema_version, "v1");
        assert_eq!(record.partition_key(), tenant.to_string());
    }

    #[test]
    fn stream_record_top_level_keys() {
        let record = StreamRecord::wrap(sample_envelope());
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["envelope", "trace_id", "tenant_id", "schema_version"] {
            assert!(obj.contains_key(key), "missing top-level key {key}");
        }
        // The nested envelope keeps every schema field
        for key in [
            "schema_version",
            "tenant_id",
            "user_id",
            "interaction_type",
            "content",
            "timestamp",
            "source",
            "extras",
            "interaction_id",
            "trace_id",
        ] {
            assert!(
                value["envelope"].as_object().unwrap().contains_key(key),
                "missing envelope key {key}"
            );
        }
    }

    #[test]
    fn bus_entry_uses_pascal_case_keys() {
        let entry = BusEntry {
            source: "com.yourapp.transcription".to_string(),
            detail_type: "BatchProcessingCompleted".to_string(),
            detail: "{}".to_string(),
            event_bus_name: "default".to_string(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["Source", "DetailType", "Detail", "EventBusName"] {
            assert!(obj.contains_key(key), "missing key {key}");
        }
    }
}
