//! Configuration resolution for eq-gateway
//!
//! All configuration comes from the environment and is resolved once at
//! startup into an immutable [`Config`]. Missing required values abort
//! startup with a readable error rather than failing on first use.

use eq_common::{Error, Result};
use tracing::warn;

/// Minimum length for the internal JWT secret
const MIN_JWT_SECRET_LEN: usize = 32;

/// AWS credential pair, absent when the runtime provides role-based creds
/// or the AWS-backed features are disabled entirely.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Identity
    pub jwt_secret: Option<String>,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub allow_legacy_header_auth: bool,
    pub mock_tenant_id: Option<String>,
    pub mock_user_id: Option<String>,

    // Object store
    pub upload_bucket: String,
    pub upload_region: String,
    pub aws_credentials: Option<AwsCredentials>,
    pub presigned_put_expiry_secs: u64,
    pub presigned_get_expiry_secs: u64,

    // Event destinations
    pub kinesis_stream: String,
    pub event_bus: String,
    pub event_source: String,
    pub enable_stream_publishing: bool,
    pub enable_bus_publishing: bool,

    // Providers
    pub openai_api_key: String,
    pub llm_model: String,
    pub deepgram_api_key: String,

    // Storage
    pub database_url: String,
    pub session_buffer_ttl_secs: u64,

    // Server
    pub bind_addr: String,
}

impl Config {
    /// Resolve configuration from the environment
    pub fn from_env() -> Result<Self> {
        let jwt_secret = match optional("INTERNAL_JWT_SECRET") {
            Some(secret) if secret.len() < MIN_JWT_SECRET_LEN => {
                return Err(Error::Config(format!(
                    "INTERNAL_JWT_SECRET is too short (min {MIN_JWT_SECRET_LEN} chars)"
                )));
            }
            other => other,
        };

        let allow_legacy_header_auth = flag("ALLOW_LEGACY_HEADER_AUTH", false);
        if jwt_secret.is_none() && !allow_legacy_header_auth {
            return Err(Error::Config(
                "No authentication mode configured: set INTERNAL_JWT_SECRET or \
                 ALLOW_LEGACY_HEADER_AUTH=true"
                    .to_string(),
            ));
        }

        let aws_credentials = match (
            optional("AWS_ACCESS_KEY_ID"),
            optional("AWS_SECRET_ACCESS_KEY"),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Some(AwsCredentials {
                access_key_id,
                secret_access_key,
            }),
            (None, None) => {
                warn!(
                    "AWS credentials not found; object store and event publishing \
                     will be disabled"
                );
                None
            }
            _ => {
                return Err(Error::Config(
                    "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together"
                        .to_string(),
                ));
            }
        };

        let region = optional("UPLOAD_REGION")
            .or_else(|| optional("AWS_REGION"))
            .unwrap_or_else(|| "us-east-1".to_string());

        Ok(Self {
            jwt_secret,
            jwt_issuer: string("INTERNAL_JWT_ISSUER", "eq-frontend"),
            jwt_audience: string("INTERNAL_JWT_AUDIENCE", "eq-backend"),
            allow_legacy_header_auth,
            mock_tenant_id: optional("MOCK_TENANT_ID"),
            mock_user_id: optional("MOCK_USER_ID"),
            upload_bucket: string("UPLOAD_BUCKET_NAME", "eq-live-transcription-uploads-dev"),
            upload_region: region,
            aws_credentials,
            presigned_put_expiry_secs: number("PRESIGNED_PUT_EXPIRY_SECS", 300),
            presigned_get_expiry_secs: number("PRESIGNED_GET_EXPIRY_SECS", 3600),
            kinesis_stream: string("KINESIS_STREAM_NAME", "eq-interactions-stream-dev"),
            event_bus: string("EVENTBRIDGE_BUS_NAME", "default"),
            event_source: string("EVENT_SOURCE", "com.yourapp.transcription"),
            enable_stream_publishing: flag("ENABLE_STREAM_PUBLISHING", true),
            enable_bus_publishing: flag("ENABLE_BUS_PUBLISHING", true),
            openai_api_key: required("OPENAI_API_KEY")?,
            llm_model: string("LLM_MODEL", "gpt-4o"),
            deepgram_api_key: required("DEEPGRAM_API_KEY")?,
            database_url: required("DATABASE_URL")?,
            session_buffer_ttl_secs: number("SESSION_BUFFER_TTL_SECS", 86_400),
            bind_addr: string("BIND_ADDR", "127.0.0.1:8000"),
        })
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> Result<String> {
    optional(name).ok_or_else(|| Error::Config(format!("{name} is required")))
}

fn string(name: &str, default: &str) -> String {
    optional(name).unwrap_or_else(|| default.to_string())
}

fn flag(name: &str, default: bool) -> bool {
    match optional(name) {
        Some(value) => !matches!(value.to_lowercase().as_str(), "false" | "0" | "no"),
        None => default,
    }
}

fn number(name: &str, default: u64) -> u64 {
    optional(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
