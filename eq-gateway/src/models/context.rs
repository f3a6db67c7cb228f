//! Per-request identity context
//!
//! Resolved once at the edge of every request, immutable thereafter, and
//! shared by read-only reference with every downstream call and lane.

use uuid::Uuid;

/// Identity and correlation context for one request
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Tenant/organization UUID
    pub tenant_id: Uuid,
    /// Opaque user identifier (supports provider-prefixed forms)
    pub user_id: String,
    /// Optional bridge to the secondary user key
    pub pg_user_id: Option<String>,
    /// Optional display name
    pub user_name: Option<String>,
    /// Optional account identifier
    pub account_id: Option<String>,
    /// Freshly minted for this request (or inherited by the upload worker)
    pub interaction_id: Uuid,
    /// Preserved from the caller when valid, otherwise freshly minted
    pub trace_id: Uuid,
}

impl RequestContext {
    /// Context for an internal caller that already owns its correlation ids
    /// (the upload worker carries the ids recorded at job creation).
    pub fn internal(
        tenant_id: Uuid,
        user_id: String,
        interaction_id: Uuid,
        trace_id: Uuid,
    ) -> Self {
        Self {
            tenant_id,
            user_id,
            pg_user_id: None,
            user_name: None,
            account_id: None,
            interaction_id,
            trace_id,
        }
    }
}
