//! Intelligence row persistence
//!
//! Writes the mirrored `interaction_summary_entries` and
//! `interaction_insights` tables and reads `personas`. All rows for one
//! extraction commit in a single transaction: five summaries and every
//! insight land together or not at all. The enum symbols cast here must
//! match the externally managed Postgres enum types exactly.

use anyhow::{bail, Result};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::InteractionAnalysis;
use crate::services::intelligence::{insight_rows, summary_rows, PersistMeta};

/// Look up a persona id by code within the transaction
async fn persona_id(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    code: &str,
) -> Result<Uuid> {
    let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM personas WHERE code = $1")
        .bind(code)
        .fetch_optional(&mut **tx)
        .await?;

    match id {
        Some(id) => Ok(id),
        None => bail!("persona '{code}' not found (PERSONA_UNKNOWN)"),
    }
}

/// Persist one extraction atomically: 5 summary rows + N insight rows
pub async fn persist_analysis(
    pool: &PgPool,
    analysis: &InteractionAnalysis,
    meta: &PersistMeta,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    let persona = persona_id(&mut tx, &meta.persona_code).await?;
    let now = Utc::now();

    for (level, text) in summary_rows(analysis) {
        sqlx::query(
            r#"
            INSERT INTO interaction_summary_entries (
                id, tenant_id, interaction_id, persona_id, level, text, word_count,
                profile_type, source, trace_id, interaction_type, account_id,
                interaction_timestamp, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5::"SummaryLevel", $6, $7,
                'rich'::"ProfileType", $8, $9, $10, $11, $12, $13, $13
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(meta.tenant_id)
        .bind(meta.interaction_id)
        .bind(persona)
        .bind(level)
        .bind(text)
        .bind(text.split_whitespace().count() as i32)
        .bind(&meta.source)
        .bind(meta.trace_id)
        .bind(&meta.interaction_type)
        .bind(meta.account_id)
        .bind(meta.interaction_timestamp)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    for row in insight_rows(analysis) {
        sqlx::query(
            r#"
            INSERT INTO interaction_insights (
                id, tenant_id, interaction_id, persona_id, type,
                description, owner, due_date, text, decision, rationale,
                risk, severity, mitigation, content_hash,
                trace_id, interaction_type, account_id, interaction_timestamp,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5::"InsightType",
                $6, $7, $8, $9, $10, $11,
                $12, $13::"RiskSeverity", $14, $15,
                $16, $17, $18, $19, $20, $20
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(meta.tenant_id)
        .bind(meta.interaction_id)
        .bind(persona)
        .bind(row.insight_type)
        .bind(&row.description)
        .bind(&row.owner)
        .bind(row.due_date)
        .bind(&row.text)
        .bind(&row.decision)
        .bind(&row.rationale)
        .bind(&row.risk)
        .bind(row.severity)
        .bind(&row.mitigation)
        .bind(&row.content_hash)
        .bind(meta.trace_id)
        .bind(&meta.interaction_type)
        .bind(meta.account_id)
        .bind(meta.interaction_timestamp)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        interaction_id = %meta.interaction_id,
        summaries = 5,
        insights = analysis.insight_count(),
        "Persisted intelligence"
    );

    Ok(())
}
