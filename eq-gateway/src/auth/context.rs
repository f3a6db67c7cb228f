//! RequestContext resolution
//!
//! Precedence: signed token first; when no token is present and legacy
//! header mode is enabled, `X-Tenant-ID`/`X-User-ID` headers (with the
//! dev-only `MOCK_TENANT_ID`/`MOCK_USER_ID` fallbacks); otherwise the
//! request fails with `AUTH_MISSING`.
//!
//! `trace_id` is preserved when the caller sent a valid UUID, otherwise
//! minted. `interaction_id` is freshly minted unless an internal caller
//! explicitly carried one in its token claims.

use axum::http::HeaderMap;
use tracing::info;
use uuid::Uuid;

use crate::auth::jwt::{extract_bearer_token, verify_internal_jwt};
use crate::config::Config;
use crate::error::ApiError;
use crate::models::RequestContext;

/// Resolve the identity context for an HTTP request
pub fn resolve_context(headers: &HeaderMap, config: &Config) -> Result<RequestContext, ApiError> {
    let authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok());

    if let Some(header_value) = authorization {
        // A present Authorization header must carry a valid bearer token;
        // it does not fall through to legacy mode.
        let token = extract_bearer_token(Some(header_value))
            .ok_or_else(|| ApiError::AuthInvalid("Malformed Authorization header".into()))?;
        return resolve_token_context(token, config);
    }

    if config.allow_legacy_header_auth {
        return resolve_legacy_context(headers, config);
    }

    Err(ApiError::AuthMissing)
}

/// Resolve context from a bearer token (shared with the WebSocket path,
/// where the token arrives as a query parameter).
pub fn resolve_token_context(token: &str, config: &Config) -> Result<RequestContext, ApiError> {
    let claims = verify_internal_jwt(token, config)?;

    // Validated as a UUID during verification
    let tenant_id = Uuid::parse_str(&claims.tenant_id)
        .map_err(|_| ApiError::AuthInvalid("Invalid tenant_id claim".into()))?;

    let trace_id = claims
        .trace_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .unwrap_or_else(Uuid::new_v4);

    let interaction_id = claims
        .interaction_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .unwrap_or_else(Uuid::new_v4);

    let context = RequestContext {
        tenant_id,
        user_id: claims.user_id,
        pg_user_id: claims.pg_user_id,
        user_name: claims.user_name,
        account_id: claims.account_id,
        interaction_id,
        trace_id,
    };

    info!(
        interaction_id = %context.interaction_id,
        tenant_id = %context.tenant_id,
        trace_id = %context.trace_id,
        "Context resolved from signed token"
    );

    Ok(context)
}

/// Legacy header mode, enabled by `ALLOW_LEGACY_HEADER_AUTH` (off in
/// production). Headers win over the mock environment fallbacks.
fn resolve_legacy_context(headers: &HeaderMap, config: &Config) -> Result<RequestContext, ApiError> {
    let header = |name: &str| -> Option<String> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .filter(|value| !value.trim().is_empty())
    };

    let tenant_raw = header("x-tenant-id")
        .or_else(|| config.mock_tenant_id.clone())
        .ok_or(ApiError::AuthMissing)?;
    let tenant_id = Uuid::parse_str(&tenant_raw).map_err(|_| {
        ApiError::validation(
            "VALIDATION_INVALID_UUID",
            "X-Tenant-ID must be a valid UUID",
        )
    })?;

    let user_id = header("x-user-id")
        .or_else(|| config.mock_user_id.clone())
        .ok_or_else(|| {
            ApiError::validation("VALIDATION_MISSING_FIELD", "X-User-ID header is required")
        })?;

    let trace_id = header("x-trace-id")
        .and_then(|raw| Uuid::parse_str(&raw).ok())
        .unwrap_or_else(Uuid::new_v4);

    let context = RequestContext {
        tenant_id,
        user_id,
        pg_user_id: None,
        user_name: None,
        account_id: header("x-account-id"),
        interaction_id: Uuid::new_v4(),
        trace_id,
    };

    info!(
        interaction_id = %context.interaction_id,
        tenant_id = %context.tenant_id,
        trace_id = %context.trace_id,
        "Context resolved from legacy headers"
    );

    Ok(context)
}
