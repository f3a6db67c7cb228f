//! Internal JWT verification
//!
//! Verifies the HS256 tokens minted by the identity gateway. Signature,
//! issuer, audience and expiry (with ~30 s leeway) are all enforced, and
//! the required custom claims (`tenant_id` as a UUID, non-empty `user_id`)
//! are validated here. Tokens are never logged beyond their first 8 chars.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;

/// Clock skew tolerance in seconds for expiry validation
const CLOCK_SKEW_LEEWAY_SECS: u64 = 30;

/// Claims carried by an internal JWT
#[derive(Debug, Deserialize)]
pub struct JwtClaims {
    pub tenant_id: String,
    pub user_id: String,
    #[serde(default)]
    pub pg_user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub interaction_id: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Extract the token from an `Authorization` header value.
///
/// Returns `None` when the header is missing or not a bearer scheme.
pub fn extract_bearer_token(authorization: Option<&str>) -> Option<&str> {
    let value = authorization?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Verify an internal JWT and extract its claims
pub fn verify_internal_jwt(token: &str, config: &Config) -> Result<JwtClaims, ApiError> {
    let secret = config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| ApiError::AuthInvalid("Token authentication not configured".into()))?;

    debug!(
        token_prefix = token.get(..8).unwrap_or(token),
        "Verifying internal JWT"
    );

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.jwt_issuer]);
    validation.set_audience(&[&config.jwt_audience]);
    validation.leeway = CLOCK_SKEW_LEEWAY_SECS;
    validation.set_required_spec_claims(&["exp", "iat", "iss", "aud"]);

    let data = decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|err| match err.kind() {
        ErrorKind::ExpiredSignature => {
            warn!("JWT has expired");
            ApiError::AuthExpired
        }
        ErrorKind::InvalidIssuer => {
            warn!("JWT has invalid issuer");
            ApiError::AuthInvalid("Invalid token issuer".into())
        }
        ErrorKind::InvalidAudience => {
            warn!("JWT has invalid audience");
            ApiError::AuthInvalid("Invalid token audience".into())
        }
        other => {
            warn!(kind = ?other, "JWT verification failed");
            ApiError::AuthInvalid("Invalid token".into())
        }
    })?;

    let claims = data.claims;

    if Uuid::parse_str(&claims.tenant_id).is_err() {
        warn!("JWT tenant_id is not a valid UUID");
        return Err(ApiError::AuthInvalid(
            "Invalid tenant_id claim: must be UUID".into(),
        ));
    }
    if claims.user_id.trim().is_empty() {
        warn!("JWT missing user_id claim");
        return Err(ApiError::AuthInvalid("Missing required claim: user_id".into()));
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn test_config() -> Config {
        Config {
            jwt_secret: Some(SECRET.to_string()),
            jwt_issuer: "eq-frontend".to_string(),
            jwt_audience: "eq-backend".to_string(),
            allow_legacy_header_auth: false,
            mock_tenant_id: None,
            mock_user_id: None,
            upload_bucket: "test".to_string(),
            upload_region: "us-east-1".to_string(),
            aws_credentials: None,
            presigned_put_expiry_secs: 300,
            presigned_get_expiry_secs: 3600,
            kinesis_stream: "test".to_string(),
            event_bus: "default".to_string(),
            event_source: "com.yourapp.transcription".to_string(),
            enable_stream_publishing: true,
            enable_bus_publishing: true,
            openai_api_key: "test".to_string(),
            llm_model: "gpt-4o".to_string(),
            deepgram_api_key: "test".to_string(),
            database_url: "postgres://localhost/test".to_string(),
            session_buffer_ttl_secs: 86_400,
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }

    fn mint(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn base_claims() -> serde_json::Value {
        let now = Utc::now().timestamp();
        json!({
            "tenant_id": Uuid::new_v4().to_string(),
            "user_id": "auth0|abc123",
            "iss": "eq-frontend",
            "aud": "eq-backend",
            "iat": now,
            "exp": now + 300,
        })
    }

    #[test]
    fn valid_token_verifies() {
        let claims = base_claims();
        let token = mint(claims.clone());
        let verified = verify_internal_jwt(&token, &test_config()).unwrap();
        assert_eq!(verified.tenant_id, claims["tenant_id"].as_str().unwrap());
        assert_eq!(verified.user_id, "auth0|abc123");
    }

    #[test]
    fn expired_token_rejected() {
        let mut claims = base_claims();
        let now = Utc::now().timestamp();
        claims["iat"] = json!(now - 600);
        claims["exp"] = json!(now - 120);
        let token = mint(claims);
        assert!(matches!(
            verify_internal_jwt(&token, &test_config()),
            Err(ApiError::AuthExpired)
        ));
    }

    #[test]
    fn expiry_within_skew_tolerated() {
        let mut claims = base_claims();
        let now = Utc::now().timestamp();
        claims["exp"] = json!(now - 10); // inside the 30 s leeway
        let token = mint(claims);
        assert!(verify_internal_jwt(&token, &test_config()).is_ok());
    }

    #[test]
    fn wrong_issuer_rejected() {
        let mut claims = base_claims();
        claims["iss"] = json!("someone-else");
        let token = mint(claims);
        assert!(matches!(
            verify_internal_jwt(&token, &test_config()),
            Err(ApiError::AuthInvalid(_))
        ));
    }

    #[test]
    fn wrong_audience_rejected() {
        let mut claims = base_claims();
        claims["aud"] = json!("other-service");
        let token = mint(claims);
        assert!(matches!(
            verify_internal_jwt(&token, &test_config()),
            Err(ApiError::AuthInvalid(_))
        ));
    }

    #[test]
    fn wrong_signature_rejected() {
        let token = encode(
            &Header::default(),
            &base_claims(),
            &EncodingKey::from_secret(b"another-secret-another-secret-xx"),
        )
        .unwrap();
        assert!(matches!(
            verify_internal_jwt(&token, &test_config()),
            Err(ApiError::AuthInvalid(_))
        ));
    }

    #[test]
    fn non_uuid_tenant_rejected() {
        let mut claims = base_claims();
        claims["tenant_id"] = json!("org-42");
        let token = mint(claims);
        assert!(matches!(
            verify_internal_jwt(&token, &test_config()),
            Err(ApiError::AuthInvalid(_))
        ));
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(extract_bearer_token(Some("Bearer ")), None);
        assert_eq!(extract_bearer_token(Some("Basic abc")), None);
        assert_eq!(extract_bearer_token(None), None);
    }
}
