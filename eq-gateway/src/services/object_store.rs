//! Object store client for the presigned upload workflow
//!
//! Issues short-lived presigned PUT URLs for browser uploads, presigned
//! GET URLs for the transcription provider to fetch from, and a signed
//! HEAD to verify an object landed. Keys are tenant-scoped:
//! `tenant/{tenant_id}/uploads/{job_id}/{filename}`.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::utils::sigv4::{SigV4Signer, EMPTY_PAYLOAD_HASH};

/// Longest filename kept in an object key; longer names are truncated
/// preserving the extension.
const MAX_KEY_FILENAME_LEN: usize = 100;

/// Object store errors
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Filename failed validation
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// Network or service failure
    #[error("Object store unavailable: {0}")]
    Unavailable(String),
}

/// S3-compatible object store client
pub struct ObjectStoreClient {
    http_client: reqwest::Client,
    signer: SigV4Signer,
    bucket: String,
    region: String,
    put_expiry_secs: u64,
    get_expiry_secs: u64,
}

impl ObjectStoreClient {
    /// Build the client from configuration. Returns `None` when no
    /// credentials are configured; upload endpoints then answer 500
    /// `STORAGE_UNAVAILABLE`.
    pub fn from_config(config: &Config) -> Option<Self> {
        let creds = match &config.aws_credentials {
            Some(creds) => creds,
            None => {
                warn!("Object store disabled: no credentials configured");
                return None;
            }
        };

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .ok()?;

        info!(
            bucket = %config.upload_bucket,
            region = %config.upload_region,
            "Object store client initialized"
        );

        Some(Self {
            http_client,
            signer: SigV4Signer::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                config.upload_region.clone(),
                "s3",
            ),
            bucket: config.upload_bucket.clone(),
            region: config.upload_region.clone(),
            put_expiry_secs: config.presigned_put_expiry_secs,
            get_expiry_secs: config.presigned_get_expiry_secs,
        })
    }

    fn host(&self) -> String {
        format!("{}.s3.{}.amazonaws.com", self.bucket, self.region)
    }

    /// Build the tenant-scoped object key for an upload.
    ///
    /// Filenames containing path separators are rejected outright; names
    /// over the length cap are truncated preserving the extension.
    pub fn generate_file_key(
        tenant_id: Uuid,
        job_id: Uuid,
        filename: &str,
    ) -> Result<String, ObjectStoreError> {
        if filename.is_empty() {
            return Err(ObjectStoreError::InvalidFilename(
                "filename must not be empty".to_string(),
            ));
        }
        if filename.contains('/') || filename.contains('\\') {
            return Err(ObjectStoreError::InvalidFilename(
                "filename must not contain path separators".to_string(),
            ));
        }

        let safe = truncate_filename(filename, MAX_KEY_FILENAME_LEN);
        Ok(format!("tenant/{tenant_id}/uploads/{job_id}/{safe}"))
    }

    /// True iff the key lives under this tenant's prefix
    pub fn key_belongs_to_tenant(file_key: &str, tenant_id: Uuid) -> bool {
        file_key.starts_with(&format!("tenant/{tenant_id}/"))
    }

    /// Generate a presigned PUT URL for the browser upload
    pub fn presigned_put_url(
        &self,
        file_key: &str,
        content_type: &str,
    ) -> (String, DateTime<Utc>) {
        let now = Utc::now();
        let url = self.signer.presign(
            "PUT",
            &self.host(),
            &format!("/{file_key}"),
            &BTreeMap::from([("content-type".to_string(), content_type.to_string())]),
            self.put_expiry_secs,
            now,
        );
        let expires_at = now + Duration::seconds(self.put_expiry_secs as i64);
        info!(
            key_prefix = key_prefix(file_key),
            expires_in = self.put_expiry_secs,
            "Generated presigned PUT URL"
        );
        (url, expires_at)
    }

    /// Generate a presigned GET URL for the transcription provider.
    ///
    /// Lives longer than the PUT URL so the provider has time to start
    /// fetching.
    pub fn presigned_get_url(&self, file_key: &str) -> String {
        let url = self.signer.presign(
            "GET",
            &self.host(),
            &format!("/{file_key}"),
            &BTreeMap::new(),
            self.get_expiry_secs,
            Utc::now(),
        );
        info!(
            key_prefix = key_prefix(file_key),
            expires_in = self.get_expiry_secs,
            "Generated presigned GET URL"
        );
        url
    }

    /// Verify an object exists (signed HEAD)
    pub async fn object_exists(&self, file_key: &str) -> Result<bool, ObjectStoreError> {
        let host = self.host();
        let path = format!("/{file_key}");
        let headers = BTreeMap::from([
            ("host".to_string(), host.clone()),
            (
                "x-amz-content-sha256".to_string(),
                EMPTY_PAYLOAD_HASH.to_string(),
            ),
        ]);
        let signed = self
            .signer
            .sign("HEAD", &path, &BTreeMap::new(), &headers, b"", Utc::now());

        let response = self
            .http_client
            .head(format!("https://{host}{path}"))
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", EMPTY_PAYLOAD_HASH)
            .header("authorization", &signed.authorization)
            .send()
            .await
            .map_err(|err| ObjectStoreError::Unavailable(err.to_string()))?;

        if response.status().is_success() {
            debug!(key_prefix = key_prefix(file_key), "Object exists");
            Ok(true)
        } else if response.status() == reqwest::StatusCode::NOT_FOUND {
            warn!(
                key_prefix = key_prefix(file_key),
                "Object not found"
            );
            Ok(false)
        } else {
            Err(ObjectStoreError::Unavailable(format!(
                "HEAD returned {}",
                response.status()
            )))
        }
    }
}

/// Shortened key for log lines
fn key_prefix(file_key: &str) -> &str {
    file_key.get(..50).unwrap_or(file_key)
}

/// Truncate a filename to `max_len`, keeping the extension when present
fn truncate_filename(filename: &str, max_len: usize) -> String {
    if filename.len() <= max_len {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((name, ext)) if !name.is_empty() && ext.len() < max_len => {
            let keep = max_len.saturating_sub(ext.len() + 1);
            format!("{}.{ext}", truncate_at_char_boundary(name, keep))
        }
        _ => truncate_at_char_boundary(filename, max_len).to_string(),
    }
}

fn truncate_at_char_boundary(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_key_is_tenant_scoped() {
        let tenant = Uuid::new_v4();
        let job = Uuid::new_v4();
        let key = ObjectStoreClient::generate_file_key(tenant, job, "call.mp3").unwrap();
        assert_eq!(key, format!("tenant/{tenant}/uploads/{job}/call.mp3"));
        assert!(ObjectStoreClient::key_belongs_to_tenant(&key, tenant));
        assert!(!ObjectStoreClient::key_belongs_to_tenant(
            &key,
            Uuid::new_v4()
        ));
    }

    #[test]
    fn path_separators_rejected() {
        let tenant = Uuid::new_v4();
        let job = Uuid::new_v4();
        assert!(ObjectStoreClient::generate_file_key(tenant, job, "../../etc/passwd").is_err());
        assert!(ObjectStoreClient::generate_file_key(tenant, job, "a\\b.mp3").is_err());
        assert!(ObjectStoreClient::generate_file_key(tenant, job, "").is_err());
    }

    #[test]
    fn long_filenames_truncate_preserving_extension() {
        let long = format!("{}.mp3", "x".repeat(200));
        let truncated = truncate_filename(&long, 100);
        assert!(truncated.len() <= 100);
        assert!(truncated.ends_with(".mp3"));
    }
}
