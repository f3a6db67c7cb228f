//! Upload job persistence
//!
//! All status transitions are atomic updates guarded by the prior state,
//! so at most one worker ever observes a job in `processing` and
//! terminal states can never be left. Every tenant-facing query is
//! scoped by `tenant_id`.

use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{JobStatus, JobType, UploadJob};

const JOB_COLUMNS: &str = "id, tenant_id, user_id, pg_user_id, user_name, job_type, status, \
     file_key, file_name, mime_type, file_size, interaction_id, trace_id, account_id, \
     error_message, error_code, result_summary, metadata_json, \
     created_at, updated_at, started_at, completed_at";

fn row_to_job(row: &PgRow) -> Result<UploadJob> {
    let status_raw: String = row.try_get("status")?;
    let status = JobStatus::parse(&status_raw)
        .ok_or_else(|| anyhow!("unknown job status in database: {status_raw}"))?;
    let job_type_raw: String = row.try_get("job_type")?;
    let job_type = JobType::parse(&job_type_raw)
        .ok_or_else(|| anyhow!("unknown job type in database: {job_type_raw}"))?;

    Ok(UploadJob {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        user_id: row.try_get("user_id")?,
        pg_user_id: row.try_get("pg_user_id")?,
        user_name: row.try_get("user_name")?,
        job_type,
        status,
        file_key: row.try_get("file_key")?,
        file_name: row.try_get("file_name")?,
        mime_type: row.try_get("mime_type")?,
        file_size: row.try_get("file_size")?,
        interaction_id: row.try_get("interaction_id")?,
        trace_id: row.try_get("trace_id")?,
        account_id: row.try_get("account_id")?,
        error_message: row.try_get("error_message")?,
        error_code: row.try_get("error_code")?,
        result_summary: row.try_get("result_summary")?,
        metadata_json: row.try_get("metadata_json")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Insert a freshly minted job row
pub async fn insert_job(pool: &PgPool, job: &UploadJob) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO upload_jobs (
            id, tenant_id, user_id, pg_user_id, user_name, job_type, status,
            file_key, file_name, mime_type, file_size, interaction_id, trace_id,
            account_id, metadata_json, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#,
    )
    .bind(job.id)
    .bind(job.tenant_id)
    .bind(&job.user_id)
    .bind(&job.pg_user_id)
    .bind(&job.user_name)
    .bind(job.job_type.as_str())
    .bind(job.status.as_str())
    .bind(&job.file_key)
    .bind(&job.file_name)
    .bind(&job.mime_type)
    .bind(job.file_size)
    .bind(job.interaction_id)
    .bind(&job.trace_id)
    .bind(&job.account_id)
    .bind(&job.metadata_json)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a job by id, scoped to the caller's tenant.
///
/// A job owned by another tenant reads as absent, never as forbidden.
pub async fn find_for_tenant(
    pool: &PgPool,
    job_id: Uuid,
    tenant_id: Uuid,
) -> Result<Option<UploadJob>> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM upload_jobs WHERE id = $1 AND tenant_id = $2"
    ))
    .bind(job_id)
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_job).transpose()
}

/// Load a job by its object key, scoped to the caller's tenant
pub async fn find_for_tenant_by_key(
    pool: &PgPool,
    tenant_id: Uuid,
    file_key: &str,
) -> Result<Option<UploadJob>> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM upload_jobs WHERE tenant_id = $1 AND file_key = $2"
    ))
    .bind(tenant_id)
    .bind(file_key)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_job).transpose()
}

/// Atomically claim a queued job for processing.
///
/// Zero rows means another worker got there first; the caller drops the
/// job. `started_at` is stamped on this first transition.
pub async fn claim_queued(pool: &PgPool, job_id: Uuid) -> Result<Option<UploadJob>> {
    let now = Utc::now();
    let row = sqlx::query(&format!(
        "UPDATE upload_jobs \
         SET status = 'processing', started_at = $2, updated_at = $2 \
         WHERE id = $1 AND status = 'queued' \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(job_id)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_job).transpose()
}

/// Reset a failed job to queued for a retry, clearing its error fields
pub async fn requeue_failed(pool: &PgPool, job_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE upload_jobs \
         SET status = 'queued', error_message = NULL, error_code = NULL, \
             completed_at = NULL, updated_at = $2 \
         WHERE id = $1 AND status = 'failed'",
    )
    .bind(job_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Merge caller-provided upload metadata onto the row
pub async fn update_upload_metadata(
    pool: &PgPool,
    job_id: Uuid,
    file_name: Option<&str>,
    mime_type: Option<&str>,
    file_size: Option<i64>,
    metadata_json: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE upload_jobs \
         SET file_name = COALESCE($2, file_name), \
             mime_type = COALESCE($3, mime_type), \
             file_size = COALESCE($4, file_size), \
             metadata_json = COALESCE($5, metadata_json), \
             updated_at = $6 \
         WHERE id = $1",
    )
    .bind(job_id)
    .bind(file_name)
    .bind(mime_type)
    .bind(file_size)
    .bind(metadata_json)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Terminal transition: processing -> succeeded
pub async fn mark_succeeded(pool: &PgPool, job_id: Uuid, result_summary: &str) -> Result<bool> {
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE upload_jobs \
         SET status = 'succeeded', result_summary = $2, completed_at = $3, updated_at = $3 \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(job_id)
    .bind(result_summary)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Terminal transition to failed, from any non-terminal state
pub async fn mark_failed(
    pool: &PgPool,
    job_id: Uuid,
    error_code: &str,
    error_message: &str,
) -> Result<bool> {
    let now = Utc::now();
    // Keep error detail brief and free of sensitive payloads
    let trimmed: String = error_message.chars().take(500).collect();
    let result = sqlx::query(
        "UPDATE upload_jobs \
         SET status = 'failed', error_code = $2, error_message = $3, \
             completed_at = $4, updated_at = $4 \
         WHERE id = $1 AND status IN ('queued', 'processing')",
    )
    .bind(job_id)
    .bind(error_code)
    .bind(&trimmed)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fail jobs stuck in `processing` beyond `max_age_minutes`.
///
/// Run at startup to recover from crashes: a processing job with no
/// living worker will never progress on its own.
pub async fn reap_stuck(pool: &PgPool, max_age_minutes: i64) -> Result<u64> {
    let cutoff = Utc::now() - chrono::Duration::minutes(max_age_minutes);
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE upload_jobs \
         SET status = 'failed', error_code = 'PROCESSING_TIMEOUT', \
             error_message = 'Job timed out (server restart or crash)', \
             completed_at = $2, updated_at = $2 \
         WHERE status = 'processing' AND started_at < $1",
    )
    .bind(cutoff)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
