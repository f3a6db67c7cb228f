//! Intelligence extraction and persistence
//!
//! Lane I of the async fork: one schema-constrained LLM call extracts an
//! `InteractionAnalysis`, which is decomposed into exactly five summary
//! rows and one insight row per extracted item and committed in a single
//! transaction. Any failure on this lane is absorbed here; the caller's
//! response never depends on it.

use chrono::{DateTime, NaiveTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db;
use crate::models::InteractionAnalysis;
use crate::services::llm::LlmClient;

/// Extraction timeout for short transcripts
const EXTRACT_TIMEOUT_SHORT: Duration = Duration::from_secs(30);
/// Extraction timeout for long transcripts
const EXTRACT_TIMEOUT_LONG: Duration = Duration::from_secs(60);
/// Transcript length (chars) above which the long timeout applies
const LONG_TRANSCRIPT_CHARS: usize = 8_000;
/// Validation retries for the extraction call
const EXTRACT_MAX_RETRIES: u32 = 2;

/// Default persona lens for extraction
pub const DEFAULT_PERSONA_CODE: &str = "gtm";

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are an expert Go-To-Market (GTM) analyst reviewing customer interaction transcripts.\n\n\
Your role is to extract actionable intelligence that helps GTM teams:\n\
- Identify sales opportunities and deal risks\n\
- Track customer commitments and action items\n\
- Capture competitive intelligence and market signals\n\
- Surface product feedback for roadmap prioritization\n\n\
Extraction Guidelines:\n\n\
1. Summaries: Write from a GTM leader's perspective, focusing on business impact\n\
   - title: 5-10 word title capturing the essence\n\
   - headline: 1-2 sentence headline for quick scanning\n\
   - brief: 2-3 paragraph executive summary\n\
   - detailed: Comprehensive summary with all key points\n\
   - spotlight: The single most important takeaway\n\n\
2. Action Items: Capture commitments, follow-ups, and next steps with owners when mentioned\n\n\
3. Decisions: Document any agreements, approvals, or strategic choices made\n\n\
4. Risks: Identify deal risks, relationship concerns, or competitive threats with severity levels\n\n\
5. Key Takeaways: Highlight insights valuable for account strategy\n\n\
6. Product Feedback: Note feature requests, pain points, bugs, or UX issues mentioned\n\n\
7. Market Intelligence: Capture competitor mentions, market trends, or industry themes\n\n\
Be thorough but precise. Only extract information explicitly present in the transcript.\n\
Do not invent or assume information not stated.";

/// Summary level names, in persistence order
pub const SUMMARY_LEVELS: [&str; 5] = ["title", "headline", "brief", "detailed", "spotlight"];

/// One insight row ready for persistence, columns populated per type
#[derive(Debug, Clone, PartialEq)]
pub struct InsightRow {
    pub insight_type: &'static str,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub risk: Option<String>,
    pub severity: Option<&'static str>,
    pub mitigation: Option<String>,
    pub content_hash: String,
}

impl InsightRow {
    fn empty(insight_type: &'static str, content: &str) -> Self {
        Self {
            insight_type,
            description: None,
            owner: None,
            due_date: None,
            text: None,
            decision: None,
            rationale: None,
            risk: None,
            severity: None,
            mitigation: None,
            content_hash: content_hash(insight_type, content),
        }
    }
}

/// SHA-256 hex over `type:content`, the idempotency key downstream
/// consumers dedupe on.
pub fn content_hash(insight_type: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(insight_type.as_bytes());
    hasher.update(b":");
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// The five summary rows, one per level
pub fn summary_rows(analysis: &InteractionAnalysis) -> [(&'static str, &str); 5] {
    [
        ("title", analysis.summaries.title.as_str()),
        ("headline", analysis.summaries.headline.as_str()),
        ("brief", analysis.summaries.brief.as_str()),
        ("detailed", analysis.summaries.detailed.as_str()),
        ("spotlight", analysis.summaries.spotlight.as_str()),
    ]
}

/// Decompose an analysis into insight rows.
///
/// The category-to-type mapping is exact: product feedback and market
/// intelligence land under their own types, never `key_takeaway`.
pub fn insight_rows(analysis: &InteractionAnalysis) -> Vec<InsightRow> {
    let mut rows = Vec::with_capacity(analysis.insight_count());

    for item in &analysis.action_items {
        let mut row = InsightRow::empty("action_item", &item.description);
        row.description = Some(item.description.clone());
        row.owner = item.owner.clone();
        row.due_date = item
            .due_date
            .map(|date| date.and_time(NaiveTime::MIN).and_utc());
        rows.push(row);
    }

    for item in &analysis.decisions {
        let mut row = InsightRow::empty("decision_made", &item.decision);
        row.decision = Some(item.decision.clone());
        row.rationale = item.rationale.clone();
        rows.push(row);
    }

    for item in &analysis.risks {
        let mut row = InsightRow::empty("risk", &item.risk);
        row.risk = Some(item.risk.clone());
        row.severity = Some(item.severity.as_str());
        row.mitigation = item.mitigation.clone();
        rows.push(row);
    }

    for takeaway in &analysis.key_takeaways {
        let mut row = InsightRow::empty("key_takeaway", takeaway);
        row.text = Some(takeaway.clone());
        rows.push(row);
    }

    for item in &analysis.product_feedback {
        let mut row = InsightRow::empty("product_feedback", &item.text);
        row.text = Some(item.text.clone());
        rows.push(row);
    }

    for item in &analysis.market_intelligence {
        let mut row = InsightRow::empty("market_intelligence", &item.text);
        row.text = Some(item.text.clone());
        rows.push(row);
    }

    rows
}

/// Metadata accompanying one persist
#[derive(Debug, Clone)]
pub struct PersistMeta {
    pub interaction_id: Uuid,
    pub tenant_id: Uuid,
    pub trace_id: Uuid,
    pub interaction_type: String,
    pub account_id: Option<Uuid>,
    pub interaction_timestamp: DateTime<Utc>,
    pub persona_code: String,
    /// Recorded as the summary `source`, e.g. `openai:gpt-4o`
    pub source: String,
}

/// Intelligence extraction + persistence service
pub struct IntelligenceService {
    llm: Arc<LlmClient>,
    db: PgPool,
}

impl IntelligenceService {
    pub fn new(llm: Arc<LlmClient>, db: PgPool) -> Self {
        info!(model = llm.model(), "Intelligence service initialized");
        Self { llm, db }
    }

    /// Extract intelligence from a cleaned transcript and persist it.
    ///
    /// Returns the analysis on success and `None` on any failure; never
    /// propagates an error.
    #[allow(clippy::too_many_arguments)]
    pub async fn process_transcript(
        &self,
        cleaned_transcript: &str,
        interaction_id: Uuid,
        tenant_id: Uuid,
        trace_id: Uuid,
        interaction_type: &str,
        account_id: Option<&str>,
        interaction_timestamp: Option<DateTime<Utc>>,
        persona_code: &str,
    ) -> Option<InteractionAnalysis> {
        info!(
            interaction_id = %interaction_id,
            tenant_id = %tenant_id,
            trace_id = %trace_id,
            "Processing transcript for intelligence"
        );

        let analysis = match self.extract(cleaned_transcript).await {
            Some(analysis) => analysis,
            None => {
                warn!(interaction_id = %interaction_id, "Extraction returned nothing");
                return None;
            }
        };

        let account_uuid = account_id.and_then(|raw| match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(interaction_id = %interaction_id, "account_id is not a UUID, dropping");
                None
            }
        });

        let meta = PersistMeta {
            interaction_id,
            tenant_id,
            trace_id,
            interaction_type: interaction_type.to_string(),
            account_id: account_uuid,
            interaction_timestamp: interaction_timestamp.unwrap_or_else(Utc::now),
            persona_code: persona_code.to_string(),
            source: format!("openai:{}", self.llm.model()),
        };

        match db::intelligence::persist_analysis(&self.db, &analysis, &meta).await {
            Ok(()) => {
                info!(
                    interaction_id = %interaction_id,
                    summaries = SUMMARY_LEVELS.len(),
                    insights = analysis.insight_count(),
                    "Intelligence persisted"
                );
                Some(analysis)
            }
            Err(err) => {
                error!(
                    interaction_id = %interaction_id,
                    tenant_id = %tenant_id,
                    error = %err,
                    "Intelligence persistence failed"
                );
                None
            }
        }
    }

    /// Schema-constrained extraction; `None` on timeout or provider error
    async fn extract(&self, cleaned_transcript: &str) -> Option<InteractionAnalysis> {
        let timeout = if cleaned_transcript.len() > LONG_TRANSCRIPT_CHARS {
            EXTRACT_TIMEOUT_LONG
        } else {
            EXTRACT_TIMEOUT_SHORT
        };

        match self
            .llm
            .structured::<InteractionAnalysis>(
                EXTRACTION_SYSTEM_PROMPT,
                &format!("Analyze this transcript:\n\n{cleaned_transcript}"),
                "interaction_analysis",
                InteractionAnalysis::json_schema(),
                0.2,
                timeout,
                EXTRACT_MAX_RETRIES,
            )
            .await
        {
            Ok(analysis) => Some(analysis),
            Err(err) => {
                error!(error = %err, "Intelligence extraction failed");
                None
            }
        }
    }
}
