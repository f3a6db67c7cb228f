//! Background worker for presigned-upload jobs
//!
//! Claims a queued job (CAS, so at most one worker wins), fetches the
//! object by presigned URL, runs transcription and cleaning, fans out
//! the envelope and intelligence lanes, and lands the job in a terminal
//! state. Orchestrator-lane failures never fail the job: once
//! transcription and cleaning produced a result, the job succeeded.

use serde_json::{Map, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use eq_common::envelope::{Content, ContentFormat, EnvelopeV1, EventSource, InteractionType};

use crate::db;
use crate::models::UploadJob;
use crate::services::cleaner::CleanerService;
use crate::services::intelligence::{IntelligenceService, DEFAULT_PERSONA_CODE};
use crate::services::object_store::ObjectStoreClient;
use crate::services::orchestrator::run_fork;
use crate::services::publisher::FanOutPublisher;
use crate::services::transcriber::{normalize_mime_type, Transcriber};

/// Minutes a job may sit in `processing` before the startup reaper
/// declares it dead
const STUCK_JOB_MAX_AGE_MINUTES: i64 = 30;

/// Processing dependencies for the upload path
pub struct UploadWorker {
    db: PgPool,
    object_store: Option<Arc<ObjectStoreClient>>,
    transcriber: Arc<Transcriber>,
    cleaner: Arc<CleanerService>,
    intelligence: Arc<IntelligenceService>,
    publisher: Arc<FanOutPublisher>,
}

impl UploadWorker {
    pub fn new(
        db: PgPool,
        object_store: Option<Arc<ObjectStoreClient>>,
        transcriber: Arc<Transcriber>,
        cleaner: Arc<CleanerService>,
        intelligence: Arc<IntelligenceService>,
        publisher: Arc<FanOutPublisher>,
    ) -> Self {
        Self {
            db,
            object_store,
            transcriber,
            cleaner,
            intelligence,
            publisher,
        }
    }

    /// Process one enqueued job to a terminal state. Absorbs every
    /// failure into the job record; nothing propagates.
    pub async fn process(&self, job_id: Uuid) {
        info!(job_id = %job_id, "Starting upload job processing");

        let job = match db::jobs::claim_queued(&self.db, job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                // Another worker claimed it, or the state moved on
                warn!(job_id = %job_id, "Job not claimable, dropping");
                return;
            }
            Err(err) => {
                error!(job_id = %job_id, error = %err, "Failed to claim job");
                return;
            }
        };

        match self.run(&job).await {
            Ok(result_summary) => {
                match db::jobs::mark_succeeded(&self.db, job_id, &result_summary).await {
                    Ok(true) => info!(job_id = %job_id, "Job completed successfully"),
                    Ok(false) => warn!(job_id = %job_id, "Job left processing before completion"),
                    Err(err) => {
                        error!(job_id = %job_id, error = %err, "Failed to mark job succeeded")
                    }
                }
            }
            Err((code, message)) => {
                error!(job_id = %job_id, code, error = %message, "Job processing failed");
                if let Err(err) = db::jobs::mark_failed(&self.db, job_id, code, &message).await {
                    error!(job_id = %job_id, error = %err, "Failed to mark job failed");
                }
            }
        }
    }

    async fn run(&self, job: &UploadJob) -> Result<String, (&'static str, String)> {
        let store = self
            .object_store
            .as_ref()
            .ok_or_else(|| {
                (
                    "STORAGE_UNAVAILABLE",
                    "object store not configured".to_string(),
                )
            })?;

        let audio_url = store.presigned_get_url(&job.file_key);
        let mime_type = normalize_mime_type(job.mime_type.as_deref().unwrap_or("audio/wav"));

        info!(job_id = %job.id, mime_type = %mime_type, "Transcribing from URL");
        let (raw_transcript, metadata) = self
            .transcriber
            .transcribe_from_url(&audio_url, &mime_type)
            .await
            .map_err(|err| ("TRANSCRIPTION_FAILED", err.to_string()))?;

        if raw_transcript.trim().is_empty() {
            // Decoded fine but no speech detected; fail with diagnostics
            return Err((
                "EMPTY_TRANSCRIPT",
                format!(
                    "Audio decoded (duration={:?}s, channels={:?}) but 0 words were detected. \
                     The file may contain silence, music, or unintelligible audio. \
                     mime_type={mime_type}, file_size={:?}, file_name={:?}",
                    metadata.duration_seconds, metadata.channels, job.file_size, job.file_name
                ),
            ));
        }

        info!(job_id = %job.id, "Cleaning transcript");
        let cleaned_transcript = self.cleaner.clean_transcript(&raw_transcript).await;

        let trace_id = job
            .trace_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .unwrap_or_else(Uuid::new_v4);

        let mut extras = Map::new();
        if let Some(pg_user_id) = &job.pg_user_id {
            extras.insert("pg_user_id".to_string(), Value::String(pg_user_id.clone()));
        }
        if let Some(user_name) = &job.user_name {
            extras.insert("user_name".to_string(), Value::String(user_name.clone()));
        }

        let envelope = EnvelopeV1::new(
            job.tenant_id,
            job.user_id.clone(),
            InteractionType::Transcript,
            Content {
                text: cleaned_transcript.clone(),
                format: ContentFormat::Diarized,
            },
            EventSource::Upload,
            extras,
            job.interaction_id,
            trace_id.to_string(),
            job.account_id.clone(),
        );

        let publisher = self.publisher.clone();
        let publish_envelope = envelope.clone();
        let intelligence = self.intelligence.clone();
        let lane_transcript = cleaned_transcript.clone();
        let tenant_id = job.tenant_id;
        let interaction_id = job.interaction_id;
        let account_id = job.account_id.clone();

        run_fork(
            interaction_id,
            async move {
                publisher.publish_envelope(&publish_envelope).await;
                Ok(())
            },
            async move {
                intelligence
                    .process_transcript(
                        &lane_transcript,
                        interaction_id,
                        tenant_id,
                        trace_id,
                        InteractionType::Transcript.as_str(),
                        account_id.as_deref(),
                        None,
                        DEFAULT_PERSONA_CODE,
                    )
                    .await;
                Ok(())
            },
        )
        .await;

        Ok(format!(
            "Transcribed {} chars, cleaned to {} chars",
            raw_transcript.len(),
            cleaned_transcript.len()
        ))
    }

    /// Startup recovery: fail jobs stuck in `processing`
    pub async fn reap_stuck_jobs(&self) {
        match db::jobs::reap_stuck(&self.db, STUCK_JOB_MAX_AGE_MINUTES).await {
            Ok(0) => info!("No stuck jobs found during startup reaper run"),
            Ok(count) => warn!(count, "Reaped stuck jobs"),
            Err(err) => error!(error = %err, "Failed to reap stuck jobs"),
        }
    }
}
