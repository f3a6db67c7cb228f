//! Cleaner output shapes
//!
//! `CleanedChunk` binds the per-chunk batch clean; `MeetingOutput` binds the
//! live-session clean, which also produces a short summary and action list
//! for the closing frame.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Structured output of one per-chunk cleaning call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedChunk {
    pub cleaned_text: String,
}

impl CleanedChunk {
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["cleaned_text"],
            "properties": {
                "cleaned_text": {
                    "type": "string",
                    "description": "The cleaned transcript chunk, speaker label preserved"
                }
            }
        })
    }
}

/// Structured output of the live-session clean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingOutput {
    /// Short summary of the session
    pub summary: String,
    /// Action items as plain strings
    #[serde(default)]
    pub action_items: Vec<String>,
    /// Cleaned diarized transcript
    pub cleaned_transcript: String,
}

impl MeetingOutput {
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["summary", "action_items", "cleaned_transcript"],
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Concise summary of the conversation"
                },
                "action_items": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Commitments and follow-ups mentioned"
                },
                "cleaned_transcript": {
                    "type": "string",
                    "description": "The cleaned transcript, speaker labels preserved"
                }
            }
        })
    }
}
