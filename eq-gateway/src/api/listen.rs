//! Live session endpoint
//!
//! WS /listen - bidirectional audio-in / transcript-out. Inbound binary
//! frames are forwarded unchanged to the downstream live-transcription
//! connection; final segments are appended to the session buffer and
//! echoed to the stream as lightweight telemetry. On close (disconnect,
//! explicit stop, or error) the buffer is drained, the cleaner and the
//! async fork run, and one `session_complete` frame goes back to the
//! client. The finalization guard runs on every exit path.

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as DgMessage;
use tracing::{error, info, warn};
use uuid::Uuid;

use eq_common::envelope::{Content, ContentFormat, EnvelopeV1, EventSource, InteractionType};
use eq_common::events::TranscriptSegmentEvent;

use crate::auth::{resolve_context, resolve_token_context};
use crate::error::ApiError;
use crate::models::RequestContext;
use crate::services::intelligence::DEFAULT_PERSONA_CODE;
use crate::services::orchestrator::run_fork;
use crate::services::session_buffer::{drain_transcript, transcript_key};
use crate::AppState;

/// Close code for rejected credentials
const CLOSE_BAD_TOKEN: u16 = 4001;
/// Close code for internal errors
const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// How long to wait for the downstream reader to drain at shutdown
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const DEEPGRAM_LIVE_URL: &str =
    "wss://api.deepgram.com/v1/listen?punctuate=true&interim_results=false";

#[derive(Debug, Deserialize)]
pub struct ListenParams {
    #[serde(default)]
    pub token: Option<String>,
}

/// Inbound control frames from the client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlFrame {
    StopRecording,
}

/// The slice of the provider's live result we act on
#[derive(Debug, Deserialize)]
struct LiveResult {
    #[serde(default)]
    channel: Option<LiveChannel>,
    #[serde(default)]
    is_final: bool,
}

#[derive(Debug, Deserialize)]
struct LiveChannel {
    #[serde(default)]
    alternatives: Vec<LiveAlternative>,
}

#[derive(Debug, Deserialize)]
struct LiveAlternative {
    #[serde(default)]
    transcript: String,
}

/// GET /listen (WebSocket upgrade)
pub async fn listen_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ListenParams>,
    headers: HeaderMap,
) -> Response {
    // Resolve identity before the upgrade; the verdict is delivered over
    // the socket so the client sees a proper close code.
    let context = match &params.token {
        Some(token) => resolve_token_context(token, &state.config),
        None => resolve_context(&headers, &state.config),
    };

    ws.on_upgrade(move |socket| handle_session(socket, state, context))
}

async fn handle_session(
    socket: WebSocket,
    state: AppState,
    context: Result<RequestContext, ApiError>,
) {
    let session_id = Uuid::new_v4();
    let (mut client_sink, mut client_stream) = socket.split();

    let context = match context {
        Ok(context) => context,
        Err(err) => {
            warn!(session_id = %session_id, error = %err, "Live session rejected");
            let _ = client_sink
                .send(WsMessage::Close(Some(CloseFrame {
                    code: CLOSE_BAD_TOKEN,
                    reason: "invalid credentials".into(),
                })))
                .await;
            return;
        }
    };

    info!(
        session_id = %session_id,
        tenant_id = %context.tenant_id,
        interaction_id = %context.interaction_id,
        "Live session established"
    );

    // Serialize all client writes through one channel so the downstream
    // reader task and this task never contend on the sink.
    let (client_tx, mut client_rx) = mpsc::channel::<WsMessage>(64);
    let writer = tokio::spawn(async move {
        while let Some(message) = client_rx.recv().await {
            let is_close = matches!(message, WsMessage::Close(_));
            if client_sink.send(message).await.is_err() || is_close {
                break;
            }
        }
    });

    // Open the downstream live-transcription connection
    let downstream = match connect_downstream(&state.config.deepgram_api_key).await {
        Ok(stream) => stream,
        Err(err) => {
            error!(session_id = %session_id, error = %err, "Downstream connect failed");
            let _ = client_tx
                .send(WsMessage::Close(Some(CloseFrame {
                    code: CLOSE_INTERNAL_ERROR,
                    reason: "transcription unavailable".into(),
                })))
                .await;
            drop(client_tx);
            let _ = writer.await;
            return;
        }
    };
    let (mut dg_sink, mut dg_stream) = downstream.split();

    // Downstream reader: echo transcripts to the client; on final
    // segments, append to the session buffer and emit telemetry. The
    // two writes are independent; one failing never blocks the other.
    let reader = {
        let state = state.clone();
        let client_tx = client_tx.clone();
        let tenant_id = context.tenant_id;
        tokio::spawn(async move {
            let key = transcript_key(session_id);
            while let Some(message) = dg_stream.next().await {
                let text = match message {
                    Ok(DgMessage::Text(text)) => text,
                    Ok(DgMessage::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                let result: LiveResult = match serde_json::from_str(&text) {
                    Ok(result) => result,
                    Err(_) => continue,
                };
                let transcript = result
                    .channel
                    .as_ref()
                    .and_then(|channel| channel.alternatives.first())
                    .map(|alt| alt.transcript.clone())
                    .unwrap_or_default();
                if transcript.is_empty() {
                    continue;
                }

                let _ = client_tx.send(WsMessage::Text(transcript.clone())).await;

                if result.is_final {
                    if let Err(err) = state.session_buffer.append(&key, &transcript).await {
                        error!(session_id = %session_id, error = %err, "Buffer append failed");
                    }
                    let event = TranscriptSegmentEvent::new(
                        transcript,
                        session_id,
                        tenant_id.to_string(),
                    );
                    if let Err(err) = state.publisher.publish_transcript_segment(&event).await {
                        warn!(session_id = %session_id, error = %err, "Segment publish failed");
                    }
                }
            }
        })
    };

    // Main loop: forward audio, watch for control frames
    while let Some(message) = client_stream.next().await {
        match message {
            Ok(WsMessage::Binary(audio)) => {
                if let Err(err) = dg_sink.send(DgMessage::Binary(audio)).await {
                    error!(session_id = %session_id, error = %err, "Downstream send failed");
                    break;
                }
            }
            Ok(WsMessage::Text(text)) => {
                if let Ok(ControlFrame::StopRecording) = serde_json::from_str(&text) {
                    info!(session_id = %session_id, "Stop requested");
                    break;
                }
            }
            Ok(WsMessage::Close(_)) | Err(_) => {
                info!(session_id = %session_id, "Client disconnected");
                break;
            }
            Ok(_) => {}
        }
    }

    // Finalization guard: runs on every exit path. Each step tolerates
    // failure so cleanup always reaches the end.
    let _ = dg_sink
        .send(DgMessage::Text(json!({"type": "CloseStream"}).to_string()))
        .await;
    let _ = dg_sink.close().await;
    if tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
        warn!(session_id = %session_id, "Downstream reader did not drain, continuing");
    }

    finalize_session(&state, &context, session_id, &client_tx).await;

    let _ = client_tx.send(WsMessage::Close(None)).await;
    drop(client_tx);
    let _ = writer.await;

    info!(session_id = %session_id, "Live session closed");
}

/// Drain the buffer and, when there is content, run the post-session
/// pipeline and send the closing frame.
async fn finalize_session(
    state: &AppState,
    context: &RequestContext,
    session_id: Uuid,
    client_tx: &mpsc::Sender<WsMessage>,
) {
    let raw_transcript = match drain_transcript(state.session_buffer.as_ref(), session_id).await {
        Ok(transcript) => transcript,
        Err(err) => {
            error!(session_id = %session_id, error = %err, "Failed to reconstruct transcript");
            return;
        }
    };

    if raw_transcript.trim().is_empty() {
        warn!(session_id = %session_id, "Session had no transcript to process");
        return;
    }

    info!(
        session_id = %session_id,
        length = raw_transcript.len(),
        "Processing session transcript"
    );

    let output = state.cleaner.clean_meeting(&raw_transcript).await;

    let mut extras = Map::new();
    if let Some(user_name) = &context.user_name {
        extras.insert("user_name".to_string(), Value::String(user_name.clone()));
    }

    let envelope = EnvelopeV1::new(
        context.tenant_id,
        context.user_id.clone(),
        InteractionType::Meeting,
        Content {
            text: output.cleaned_transcript.clone(),
            format: ContentFormat::Diarized,
        },
        EventSource::Websocket,
        extras,
        context.interaction_id,
        context.trace_id.to_string(),
        context.account_id.clone(),
    );

    let publisher = state.publisher.clone();
    let intelligence = state.intelligence.clone();
    let lane_transcript = output.cleaned_transcript.clone();
    let lane_context = context.clone();

    run_fork(
        context.interaction_id,
        async move {
            publisher.publish_envelope(&envelope).await;
            Ok(())
        },
        async move {
            intelligence
                .process_transcript(
                    &lane_transcript,
                    lane_context.interaction_id,
                    lane_context.tenant_id,
                    lane_context.trace_id,
                    InteractionType::Meeting.as_str(),
                    lane_context.account_id.as_deref(),
                    None,
                    DEFAULT_PERSONA_CODE,
                )
                .await;
            Ok(())
        },
    )
    .await;

    let frame = json!({
        "type": "session_complete",
        "summary": output.summary,
        "action_items": output.action_items,
        "cleaned_transcript": output.cleaned_transcript,
        "raw_transcript": raw_transcript,
    });
    if client_tx
        .send(WsMessage::Text(frame.to_string()))
        .await
        .is_err()
    {
        warn!(session_id = %session_id, "Client gone before session_complete frame");
    }
}

type DownstreamSocket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Open the downstream live-transcription WebSocket
async fn connect_downstream(api_key: &str) -> anyhow::Result<DownstreamSocket> {
    let mut request = DEEPGRAM_LIVE_URL.into_client_request()?;
    request.headers_mut().insert(
        "authorization",
        format!("Token {api_key}").parse()?,
    );
    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}
