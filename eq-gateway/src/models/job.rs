//! Upload job state machine
//!
//! Durable record of an async upload's progress:
//! queued -> processing -> succeeded | failed. Transitions are atomic SQL
//! updates guarded by the prior state (see `db::jobs`); this module owns the
//! state vocabulary and the in-memory row shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states never transition out
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Type of async job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    AudioTranscription,
    TextProcessing,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::AudioTranscription => "audio_transcription",
            JobType::TextProcessing => "text_processing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "audio_transcription" => Some(JobType::AudioTranscription),
            "text_processing" => Some(JobType::TextProcessing),
            _ => None,
        }
    }
}

/// One row of `upload_jobs`
///
/// `(tenant_id, file_key)` is unique; `started_at` is set iff the job ever
/// entered `processing`; `completed_at` is set iff the status is terminal.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: String,
    pub pg_user_id: Option<String>,
    pub user_name: Option<String>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub file_key: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub interaction_id: Uuid,
    pub trace_id: Option<String>,
    pub account_id: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub result_summary: Option<String>,
    pub metadata_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("cancelled"), None);
    }

    #[test]
    fn only_succeeded_and_failed_are_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn status_wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_value(JobStatus::Queued).unwrap(),
            serde_json::Value::String("queued".to_string())
        );
        assert_eq!(
            serde_json::to_value(JobType::AudioTranscription).unwrap(),
            serde_json::Value::String("audio_transcription".to_string())
        );
    }
}
