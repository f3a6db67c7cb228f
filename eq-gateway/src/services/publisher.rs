//! Fan-out event publisher
//!
//! One envelope, two best-effort destinations: the partitioned stream
//! (real-time consumers) first, then the event bus (queue-based
//! consumers). Neither failure cancels the other and nothing propagates
//! to the caller; `publish_envelope` cannot fail. Logs carry ids and
//! content lengths only, never transcript bodies.

use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, info, warn};

use eq_common::envelope::EnvelopeV1;
use eq_common::events::{BusEntry, StreamRecord, TranscriptSegmentEvent};

use crate::config::Config;
use crate::utils::sigv4::SigV4Signer;

const AMZ_JSON: &str = "application/x-amz-json-1.1";

/// Publish errors (internal; absorbed before they reach callers of the
/// fan-out entry point)
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Service error {0}: {1}")]
    Service(u16, String),

    #[error("Client not initialized")]
    NotInitialized,
}

/// Result of one fan-out attempt
#[derive(Debug, Default)]
pub struct PublishOutcome {
    pub stream_sequence: Option<String>,
    pub bus_event_id: Option<String>,
}

/// Kinesis-backed stream client
pub struct StreamClient {
    http_client: reqwest::Client,
    signer: SigV4Signer,
    endpoint_host: String,
    stream_name: String,
}

#[derive(Deserialize)]
struct PutRecordResponse {
    #[serde(rename = "SequenceNumber")]
    sequence_number: String,
}

impl StreamClient {
    fn new(config: &Config, http_client: reqwest::Client) -> Option<Self> {
        let creds = config.aws_credentials.as_ref()?;
        info!(
            stream = %config.kinesis_stream,
            region = %config.upload_region,
            "Stream client initialized"
        );
        Some(Self {
            http_client,
            signer: SigV4Signer::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                config.upload_region.clone(),
                "kinesis",
            ),
            endpoint_host: format!("kinesis.{}.amazonaws.com", config.upload_region),
            stream_name: config.kinesis_stream.clone(),
        })
    }

    /// Publish one record; the partition key orders records per tenant
    async fn put_record(
        &self,
        payload: &[u8],
        partition_key: &str,
    ) -> Result<String, PublishError> {
        let body = serde_json::to_vec(&json!({
            "StreamName": self.stream_name,
            "Data": base64::engine::general_purpose::STANDARD.encode(payload),
            "PartitionKey": partition_key,
        }))
        .map_err(|err| PublishError::Network(err.to_string()))?;

        let response = self
            .send_target("Kinesis_20131202.PutRecord", body)
            .await?;
        let parsed: PutRecordResponse = serde_json::from_slice(&response)
            .map_err(|err| PublishError::Network(format!("bad PutRecord response: {err}")))?;
        Ok(parsed.sequence_number)
    }

    async fn send_target(
        &self,
        target: &str,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, PublishError> {
        send_amz_json(
            &self.http_client,
            &self.signer,
            &self.endpoint_host,
            target,
            body,
        )
        .await
    }
}

/// Event-bus client (`PutEvents`)
pub struct BusClient {
    http_client: reqwest::Client,
    signer: SigV4Signer,
    endpoint_host: String,
    bus_name: String,
}

#[derive(Deserialize)]
struct PutEventsResponse {
    #[serde(rename = "FailedEntryCount")]
    failed_entry_count: u32,
    #[serde(rename = "Entries")]
    entries: Vec<PutEventsEntry>,
}

#[derive(Deserialize)]
struct PutEventsEntry {
    #[serde(rename = "EventId", default)]
    event_id: Option<String>,
    #[serde(rename = "ErrorCode", default)]
    error_code: Option<String>,
    #[serde(rename = "ErrorMessage", default)]
    error_message: Option<String>,
}

impl BusClient {
    fn new(config: &Config, http_client: reqwest::Client) -> Option<Self> {
        let creds = config.aws_credentials.as_ref()?;
        info!(
            bus = %config.event_bus,
            region = %config.upload_region,
            source = %config.event_source,
            "Event bus client initialized"
        );
        Some(Self {
            http_client,
            signer: SigV4Signer::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                config.upload_region.clone(),
                "events",
            ),
            endpoint_host: format!("events.{}.amazonaws.com", config.upload_region),
            bus_name: config.event_bus.clone(),
        })
    }

    async fn put_event(&self, entry: &BusEntry) -> Result<String, PublishError> {
        let body = serde_json::to_vec(&json!({ "Entries": [entry] }))
            .map_err(|err| PublishError::Network(err.to_string()))?;

        let response = send_amz_json(
            &self.http_client,
            &self.signer,
            &self.endpoint_host,
            "AWSEvents.PutEvents",
            body,
        )
        .await?;

        let parsed: PutEventsResponse = serde_json::from_slice(&response)
            .map_err(|err| PublishError::Network(format!("bad PutEvents response: {err}")))?;

        if parsed.failed_entry_count > 0 {
            let first = parsed.entries.first();
            return Err(PublishError::Service(
                200,
                format!(
                    "{}: {}",
                    first.and_then(|e| e.error_code.clone()).unwrap_or_default(),
                    first
                        .and_then(|e| e.error_message.clone())
                        .unwrap_or_default()
                ),
            ));
        }

        parsed
            .entries
            .into_iter()
            .next()
            .and_then(|entry| entry.event_id)
            .ok_or_else(|| PublishError::Network("PutEvents returned no event id".to_string()))
    }
}

/// POST a signed x-amz-json-1.1 request and return the raw success body
async fn send_amz_json(
    http_client: &reqwest::Client,
    signer: &SigV4Signer,
    host: &str,
    target: &str,
    body: Vec<u8>,
) -> Result<Vec<u8>, PublishError> {
    let headers = BTreeMap::from([
        ("host".to_string(), host.to_string()),
        ("content-type".to_string(), AMZ_JSON.to_string()),
        ("x-amz-target".to_string(), target.to_string()),
    ]);
    let signed = signer.sign("POST", "/", &BTreeMap::new(), &headers, &body, chrono::Utc::now());

    let response = http_client
        .post(format!("https://{host}/"))
        .header("content-type", AMZ_JSON)
        .header("x-amz-target", target)
        .header("x-amz-date", &signed.amz_date)
        .header("authorization", &signed.authorization)
        .body(body)
        .send()
        .await
        .map_err(|err| PublishError::Network(err.to_string()))?;

    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| PublishError::Network(err.to_string()))?;

    if !status.is_success() {
        return Err(PublishError::Service(
            status.as_u16(),
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
    }

    Ok(bytes.to_vec())
}

/// The fan-out publisher: one envelope in, two destinations attempted
pub struct FanOutPublisher {
    stream: Option<StreamClient>,
    bus: Option<BusClient>,
    event_source: String,
    bus_name: String,
    stream_enabled: bool,
    bus_enabled: bool,
}

impl FanOutPublisher {
    pub fn from_config(config: &Config) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            stream: StreamClient::new(config, http_client.clone()),
            bus: BusClient::new(config, http_client),
            event_source: config.event_source.clone(),
            bus_name: config.event_bus.clone(),
            stream_enabled: config.enable_stream_publishing,
            bus_enabled: config.enable_bus_publishing,
        }
    }

    /// Publish the envelope to every configured destination.
    ///
    /// Never fails: publish failures are logged and reflected in the
    /// outcome as `None` acks.
    pub async fn publish_envelope(&self, envelope: &EnvelopeV1) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();

        if self.stream_enabled {
            outcome.stream_sequence = match self.publish_to_stream(envelope).await {
                Ok(sequence) => {
                    info!(
                        interaction_id = %envelope.interaction_id,
                        tenant_id = %envelope.tenant_id,
                        sequence = %sequence,
                        "Stream publish success"
                    );
                    Some(sequence)
                }
                Err(PublishError::NotInitialized) => {
                    warn!(
                        interaction_id = %envelope.interaction_id,
                        tenant_id = %envelope.tenant_id,
                        "Stream client not initialized, skipping publish"
                    );
                    None
                }
                Err(err) => {
                    error!(
                        interaction_id = %envelope.interaction_id,
                        tenant_id = %envelope.tenant_id,
                        error = %err,
                        "Stream publish failed"
                    );
                    None
                }
            };
        }

        if self.bus_enabled {
            outcome.bus_event_id = match self.publish_to_bus(envelope).await {
                Ok(event_id) => {
                    info!(
                        interaction_id = %envelope.interaction_id,
                        tenant_id = %envelope.tenant_id,
                        event_id = %event_id,
                        "Bus publish success"
                    );
                    Some(event_id)
                }
                Err(PublishError::NotInitialized) => {
                    warn!(
                        interaction_id = %envelope.interaction_id,
                        tenant_id = %envelope.tenant_id,
                        "Bus client not initialized, skipping publish"
                    );
                    None
                }
                Err(err) => {
                    error!(
                        interaction_id = %envelope.interaction_id,
                        tenant_id = %envelope.tenant_id,
                        error = %err,
                        "Bus publish failed"
                    );
                    None
                }
            };
        }

        let describe = |enabled: bool, ack: &Option<String>| {
            if !enabled {
                "disabled"
            } else if ack.is_some() {
                "success"
            } else {
                "failed"
            }
        };
        info!(
            interaction_id = %envelope.interaction_id,
            tenant_id = %envelope.tenant_id,
            content_length = envelope.content.text.len(),
            stream = describe(self.stream_enabled, &outcome.stream_sequence),
            bus = describe(self.bus_enabled, &outcome.bus_event_id),
            "Envelope fan-out complete"
        );

        outcome
    }

    async fn publish_to_stream(&self, envelope: &EnvelopeV1) -> Result<String, PublishError> {
        let stream = self.stream.as_ref().ok_or(PublishError::NotInitialized)?;
        let record = StreamRecord::wrap(envelope.clone());
        let payload =
            serde_json::to_vec(&record).map_err(|err| PublishError::Network(err.to_string()))?;
        let partition_key = record.partition_key().to_string();
        stream.put_record(&payload, &partition_key).await
    }

    async fn publish_to_bus(&self, envelope: &EnvelopeV1) -> Result<String, PublishError> {
        let bus = self.bus.as_ref().ok_or(PublishError::NotInitialized)?;
        let entry = BusEntry {
            source: self.event_source.clone(),
            detail_type: "BatchProcessingCompleted".to_string(),
            detail: serde_json::to_string(envelope)
                .map_err(|err| PublishError::Network(err.to_string()))?,
            event_bus_name: self.bus_name.clone(),
        };
        bus.put_event(&entry).await
    }

    /// Publish a lightweight live-session transcript event to the stream.
    ///
    /// Live-only telemetry path; the session close publishes the full
    /// envelope separately. Failures surface to the caller, which logs
    /// and continues.
    pub async fn publish_transcript_segment(
        &self,
        event: &TranscriptSegmentEvent,
    ) -> Result<String, PublishError> {
        let stream = self.stream.as_ref().ok_or(PublishError::NotInitialized)?;
        let payload =
            serde_json::to_vec(event).map_err(|err| PublishError::Network(err.to_string()))?;
        stream.put_record(&payload, &event.tenant_id).await
    }
}
