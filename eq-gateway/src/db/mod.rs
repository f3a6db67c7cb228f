//! Database access for eq-gateway
//!
//! One shared async pool, sized for serverless hosts: few connections,
//! short lifetimes, and a liveness check on checkout. The `upload_jobs`
//! table is owned by this service and created here; the intelligence
//! tables are externally managed mirrors this service only writes.

pub mod intelligence;
pub mod jobs;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Initialize the shared connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .max_lifetime(Duration::from_secs(300))
        .idle_timeout(Duration::from_secs(60))
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    info!("Database connection pool established");
    Ok(pool)
}

/// Create the service-owned tables.
///
/// Only `upload_jobs` lives in this service's migrations; the
/// intelligence tables belong to an external schema.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS upload_jobs (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL,
            user_id TEXT NOT NULL,
            pg_user_id TEXT,
            user_name TEXT,
            job_type TEXT NOT NULL,
            status TEXT NOT NULL,
            file_key TEXT NOT NULL,
            file_name TEXT,
            mime_type TEXT,
            file_size BIGINT,
            interaction_id UUID NOT NULL,
            trace_id TEXT,
            account_id TEXT,
            error_message TEXT,
            error_code TEXT,
            result_summary TEXT,
            metadata_json TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS ix_upload_jobs_tenant ON upload_jobs (tenant_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS ix_upload_jobs_status ON upload_jobs (status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_upload_jobs_tenant_status \
         ON upload_jobs (tenant_id, status)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS ix_upload_jobs_tenant_file_key \
         ON upload_jobs (tenant_id, file_key)",
    )
    .execute(pool)
    .await?;

    info!("Database tables initialized (upload_jobs)");
    Ok(())
}
