//! Upload job state machine tests
//!
//! These run against a live Postgres (set DATABASE_URL and run with
//! `cargo test -- --ignored`). They verify the compare-and-swap
//! transition guards: one claim per job, terminal immutability, and
//! tenant-scoped visibility.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use eq_gateway::db;
use eq_gateway::models::{JobStatus, JobType, UploadJob};

async fn connect() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let pool = db::init_pool(&url).await.expect("connect");
    db::run_migrations(&pool).await.expect("migrations");
    pool
}

fn new_job(tenant_id: Uuid) -> UploadJob {
    let now = Utc::now();
    let id = Uuid::new_v4();
    UploadJob {
        id,
        tenant_id,
        user_id: "auth0|tester".to_string(),
        pg_user_id: None,
        user_name: None,
        job_type: JobType::AudioTranscription,
        status: JobStatus::Queued,
        file_key: format!("tenant/{tenant_id}/uploads/{id}/call.mp3"),
        file_name: Some("call.mp3".to_string()),
        mime_type: Some("audio/mpeg".to_string()),
        file_size: Some(1024),
        interaction_id: Uuid::new_v4(),
        trace_id: Some(Uuid::new_v4().to_string()),
        account_id: None,
        error_message: None,
        error_code: None,
        result_summary: None,
        metadata_json: None,
        created_at: now,
        updated_at: now,
        started_at: None,
        completed_at: None,
    }
}

#[tokio::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn claim_is_exclusive() {
    let pool = connect().await;
    let job = new_job(Uuid::new_v4());
    db::jobs::insert_job(&pool, &job).await.unwrap();

    // First claim wins and stamps started_at
    let claimed = db::jobs::claim_queued(&pool, job.id).await.unwrap();
    let claimed = claimed.expect("first claim succeeds");
    assert_eq!(claimed.status, JobStatus::Processing);
    assert!(claimed.started_at.is_some());

    // Second claim observes nothing claimable
    let second = db::jobs::claim_queued(&pool, job.id).await.unwrap();
    assert!(second.is_none(), "only one worker may claim a job");
}

#[tokio::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn terminal_states_are_final() {
    let pool = connect().await;
    let job = new_job(Uuid::new_v4());
    db::jobs::insert_job(&pool, &job).await.unwrap();

    db::jobs::claim_queued(&pool, job.id).await.unwrap().unwrap();
    assert!(db::jobs::mark_succeeded(&pool, job.id, "done").await.unwrap());

    // No transition leaves a terminal state
    assert!(!db::jobs::mark_failed(&pool, job.id, "INTERNAL", "late failure").await.unwrap());
    assert!(db::jobs::claim_queued(&pool, job.id).await.unwrap().is_none());

    let loaded = db::jobs::find_for_tenant(&pool, job.id, job.tenant_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status, JobStatus::Succeeded);
    assert!(loaded.completed_at.is_some());
    assert_eq!(loaded.result_summary.as_deref(), Some("done"));
}

#[tokio::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn failed_jobs_can_be_requeued() {
    let pool = connect().await;
    let job = new_job(Uuid::new_v4());
    db::jobs::insert_job(&pool, &job).await.unwrap();

    db::jobs::claim_queued(&pool, job.id).await.unwrap().unwrap();
    assert!(
        db::jobs::mark_failed(&pool, job.id, "TRANSCRIPTION_FAILED", "provider down")
            .await
            .unwrap()
    );

    assert!(db::jobs::requeue_failed(&pool, job.id).await.unwrap());
    let loaded = db::jobs::find_for_tenant(&pool, job.id, job.tenant_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status, JobStatus::Queued);
    assert!(loaded.error_code.is_none());
    assert!(loaded.error_message.is_none());
    assert!(loaded.completed_at.is_none());
}

#[tokio::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn cross_tenant_lookups_read_as_absent() {
    let pool = connect().await;
    let owner = Uuid::new_v4();
    let job = new_job(owner);
    db::jobs::insert_job(&pool, &job).await.unwrap();

    let other = Uuid::new_v4();
    assert!(db::jobs::find_for_tenant(&pool, job.id, other)
        .await
        .unwrap()
        .is_none());
    assert!(
        db::jobs::find_for_tenant_by_key(&pool, other, &job.file_key)
            .await
            .unwrap()
            .is_none()
    );

    // The owner still sees it
    assert!(db::jobs::find_for_tenant(&pool, job.id, owner)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn error_messages_are_trimmed() {
    let pool = connect().await;
    let job = new_job(Uuid::new_v4());
    db::jobs::insert_job(&pool, &job).await.unwrap();
    db::jobs::claim_queued(&pool, job.id).await.unwrap().unwrap();

    let long_message = "x".repeat(2000);
    db::jobs::mark_failed(&pool, job.id, "INTERNAL", &long_message)
        .await
        .unwrap();

    let loaded = db::jobs::find_for_tenant(&pool, job.id, job.tenant_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.error_message.unwrap().len(), 500);
}
