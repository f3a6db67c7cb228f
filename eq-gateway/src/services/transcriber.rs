//! Transcription adapter
//!
//! Converts audio (bytes or a fetchable URL) into a speaker-labeled raw
//! transcript via the provider's prerecorded API, with smart formatting
//! and diarization on. The formatting walk is the glue that turns
//! per-word speaker indices into the `SPEAKER_<n>:` one-turn-per-line
//! shape the cleaner expects.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const DEEPGRAM_LISTEN_URL: &str = "https://api.deepgram.com/v1/listen";
const TRANSCRIBE_TIMEOUT_SECS: u64 = 120;

/// Transcription errors
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// Provider did not answer within the time budget
    #[error("Transcription timed out after {TRANSCRIBE_TIMEOUT_SECS}s")]
    Timeout,

    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Provider returned an error response
    #[error("Provider error {0}: {1}")]
    Provider(u16, String),

    /// Failed to parse the provider response
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Diagnostic metadata extracted from the provider response, logged so
/// empty-transcript cases can be diagnosed from logs alone.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionMetadata {
    pub duration_seconds: Option<f64>,
    pub channels: Option<usize>,
    pub words: usize,
}

/// Map a file extension to its MIME type. Exhaustive; anything else is
/// an unsupported format.
pub fn mime_type_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_lowercase().as_str() {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "flac" => Some("audio/flac"),
        "m4a" => Some("audio/mp4"),
        "webm" => Some("audio/webm"),
        "mp4" => Some("audio/mp4"),
        _ => None,
    }
}

/// Normalize browser-reported MIME types to standard IANA types.
///
/// The object store records the Content-Type from the presigned PUT and
/// the provider uses it for format detection, so non-standard types
/// (e.g. `audio/x-m4a` on macOS) would otherwise yield empty transcripts.
pub fn normalize_mime_type(mime_type: &str) -> String {
    let normalized = match mime_type.to_lowercase().trim() {
        "audio/x-m4a" | "audio/m4a" => "audio/mp4",
        "audio/x-wav" | "audio/wave" => "audio/wav",
        "audio/x-mpeg" => "audio/mpeg",
        "video/webm" => "audio/webm",
        other => other,
    }
    .to_string();
    if normalized != mime_type {
        info!("Normalized MIME type: {mime_type} -> {normalized}");
    }
    normalized
}

// Provider response shapes (only the fields we read)

#[derive(Debug, Deserialize)]
struct ListenResponse {
    #[serde(default)]
    metadata: Option<ListenMetadata>,
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenMetadata {
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    #[serde(default)]
    words: Vec<TranscriptWord>,
}

/// One word of provider output with its optional speaker index
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptWord {
    pub word: String,
    #[serde(default)]
    pub punctuated_word: Option<String>,
    #[serde(default)]
    pub speaker: Option<u32>,
}

/// Prerecorded transcription client
pub struct Transcriber {
    http_client: reqwest::Client,
    api_key: String,
}

impl Transcriber {
    pub fn new(api_key: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TRANSCRIBE_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http_client,
            api_key,
        }
    }

    fn listen_url() -> String {
        format!("{DEEPGRAM_LISTEN_URL}?smart_format=true&diarize=true&punctuate=true")
    }

    /// Transcribe raw audio bytes
    pub async fn transcribe_bytes(
        &self,
        audio_bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<(String, TranscriptionMetadata), TranscriptionError> {
        info!(
            mime_type,
            size = audio_bytes.len(),
            "Starting transcription from bytes"
        );
        let response = self
            .http_client
            .post(Self::listen_url())
            .header("authorization", format!("Token {}", self.api_key))
            .header("content-type", mime_type)
            .body(audio_bytes)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        self.handle_response(response).await
    }

    /// Transcribe audio the provider fetches itself (presigned URL form),
    /// more efficient for large files.
    pub async fn transcribe_from_url(
        &self,
        audio_url: &str,
        mime_type: &str,
    ) -> Result<(String, TranscriptionMetadata), TranscriptionError> {
        info!(mime_type, "Starting transcription from URL");
        let response = self
            .http_client
            .post(Self::listen_url())
            .header("authorization", format!("Token {}", self.api_key))
            .json(&serde_json::json!({ "url": audio_url }))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        self.handle_response(response).await
    }

    async fn handle_response(
        &self,
        response: reqwest::Response,
    ) -> Result<(String, TranscriptionMetadata), TranscriptionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Provider(status.as_u16(), body));
        }

        let parsed: ListenResponse = response
            .json()
            .await
            .map_err(|err| TranscriptionError::Parse(err.to_string()))?;

        let words = parsed
            .results
            .channels
            .first()
            .and_then(|channel| channel.alternatives.first())
            .map(|alt| alt.words.as_slice())
            .unwrap_or(&[]);

        let metadata = TranscriptionMetadata {
            duration_seconds: parsed.metadata.as_ref().and_then(|m| m.duration),
            channels: Some(parsed.results.channels.len()),
            words: words.len(),
        };

        info!(
            duration = ?metadata.duration_seconds,
            channels = ?metadata.channels,
            words = metadata.words,
            "Provider response received"
        );

        if words.is_empty() {
            warn!("No words found in provider response");
            return Ok((String::new(), metadata));
        }

        Ok((format_diarized(words), metadata))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TranscriptionError {
    if err.is_timeout() {
        TranscriptionError::Timeout
    } else {
        TranscriptionError::Network(err.to_string())
    }
}

/// Speaker label for a turn: `SPEAKER_<n>` or `SPEAKER_UNKNOWN`
fn speaker_label(speaker: Option<u32>) -> String {
    match speaker {
        Some(index) => format!("SPEAKER_{index}"),
        None => "SPEAKER_UNKNOWN".to_string(),
    }
}

/// Walk per-word provider output into one-turn-per-line diarized form.
///
/// A new line begins whenever the speaker index changes; words from the
/// same speaker are joined with single spaces. A word with no speaker
/// continues the current turn; only a leading run without any speaker
/// becomes `SPEAKER_UNKNOWN`.
pub fn format_diarized(words: &[TranscriptWord]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current_speaker: Option<Option<u32>> = None;
    let mut current_words: Vec<&str> = Vec::new();

    for word in words {
        let text = word
            .punctuated_word
            .as_deref()
            .filter(|w| !w.is_empty())
            .unwrap_or(&word.word);
        if text.is_empty() {
            continue;
        }

        // A missing speaker continues the current turn when one exists
        let speaker = match (word.speaker, current_speaker) {
            (Some(index), _) => Some(index),
            (None, Some(current)) => current,
            (None, None) => None,
        };

        if current_speaker != Some(speaker) {
            if !current_words.is_empty() {
                if let Some(prev) = current_speaker {
                    lines.push(format!("{}: {}", speaker_label(prev), current_words.join(" ")));
                }
            }
            current_speaker = Some(speaker);
            current_words = vec![text];
        } else {
            current_words.push(text);
        }
    }

    if !current_words.is_empty() {
        if let Some(last) = current_speaker {
            lines.push(format!("{}: {}", speaker_label(last), current_words.join(" ")));
        }
    }

    let transcript = lines.join("\n");
    info!(turns = lines.len(), "Formatted diarized transcript");
    transcript
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, speaker: Option<u32>) -> TranscriptWord {
        TranscriptWord {
            word: text.to_string(),
            punctuated_word: None,
            speaker,
        }
    }

    #[test]
    fn mime_mapping_is_exhaustive() {
        assert_eq!(mime_type_for_extension("wav"), Some("audio/wav"));
        assert_eq!(mime_type_for_extension("MP3"), Some("audio/mpeg"));
        assert_eq!(mime_type_for_extension("flac"), Some("audio/flac"));
        assert_eq!(mime_type_for_extension("m4a"), Some("audio/mp4"));
        assert_eq!(mime_type_for_extension("webm"), Some("audio/webm"));
        assert_eq!(mime_type_for_extension("mp4"), Some("audio/mp4"));
        assert_eq!(mime_type_for_extension("ogg"), None);
        assert_eq!(mime_type_for_extension("txt"), None);
    }

    #[test]
    fn mime_aliases_normalize() {
        assert_eq!(normalize_mime_type("audio/x-m4a"), "audio/mp4");
        assert_eq!(normalize_mime_type("audio/wave"), "audio/wav");
        assert_eq!(normalize_mime_type("video/webm"), "audio/webm");
        assert_eq!(normalize_mime_type("audio/mpeg"), "audio/mpeg");
    }

    #[test]
    fn speaker_change_starts_a_new_line() {
        let words = vec![
            word("Hello", Some(0)),
            word("there.", Some(0)),
            word("Hi.", Some(1)),
        ];
        assert_eq!(
            format_diarized(&words),
            "SPEAKER_0: Hello there.\nSPEAKER_1: Hi."
        );
    }

    #[test]
    fn every_line_has_a_speaker_prefix() {
        let words = vec![
            word("One", Some(0)),
            word("two", Some(1)),
            word("three", Some(0)),
        ];
        let transcript = format_diarized(&words);
        for line in transcript.lines() {
            assert!(
                line.starts_with("SPEAKER_"),
                "line missing speaker prefix: {line}"
            );
        }
        assert_eq!(transcript.lines().count(), 3);
    }

    #[test]
    fn missing_speaker_continues_current_turn() {
        let words = vec![
            word("We", Some(2)),
            word("agreed", None),
            word("today.", None),
        ];
        assert_eq!(format_diarized(&words), "SPEAKER_2: We agreed today.");
    }

    #[test]
    fn leading_unknown_speaker_labeled_unknown() {
        let words = vec![word("Testing", None), word("one", None), word("two.", Some(0))];
        assert_eq!(
            format_diarized(&words),
            "SPEAKER_UNKNOWN: Testing one\nSPEAKER_0: two."
        );
    }

    #[test]
    fn punctuated_word_preferred() {
        let words = vec![TranscriptWord {
            word: "hello".to_string(),
            punctuated_word: Some("Hello,".to_string()),
            speaker: Some(0),
        }];
        assert_eq!(format_diarized(&words), "SPEAKER_0: Hello,");
    }

    #[test]
    fn empty_input_yields_empty_transcript() {
        assert_eq!(format_diarized(&[]), "");
    }

    #[test]
    fn words_joined_with_single_spaces() {
        let words = vec![word("a", Some(0)), word("b", Some(0)), word("c", Some(0))];
        assert_eq!(format_diarized(&words), "SPEAKER_0: a b c");
    }
}
