//! Session buffer store
//!
//! Per-live-session append-only chunk list used to reconstruct the full
//! raw transcript at close. Keys follow `session:<session_id>:transcript`;
//! chunks come back in insertion order; the TTL is set on first write,
//! refreshed on every append, and capped at about a day. The shipped
//! implementation is an in-process store behind the trait; a remote
//! keyed-append store slots in behind the same seam.

use async_trait::async_trait;
use eq_common::Result;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Buffer key for a session's transcript chunks
pub fn transcript_key(session_id: Uuid) -> String {
    format!("session:{session_id}:transcript")
}

/// Keyed ordered-append store with TTL
#[async_trait]
pub trait SessionBufferStore: Send + Sync {
    /// Append one chunk, preserving insertion order; refreshes the TTL
    async fn append(&self, key: &str, chunk: &str) -> Result<()>;

    /// All chunks for a key in insertion order (empty when absent/expired)
    async fn range(&self, key: &str) -> Result<Vec<String>>;

    /// Drop the key; used after successful reconstruction
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Reconstruct the raw transcript for a session: read the chunks in
/// insertion order, join with single spaces, and delete the key after a
/// successful read.
pub async fn drain_transcript(
    store: &dyn SessionBufferStore,
    session_id: Uuid,
) -> Result<String> {
    let key = transcript_key(session_id);
    let chunks = store.range(&key).await?;
    let transcript = chunks.join(" ");
    store.delete(&key).await?;
    info!(
        session_id = %session_id,
        chunks = chunks.len(),
        length = transcript.len(),
        "Session transcript reconstructed"
    );
    Ok(transcript)
}

struct BufferEntry {
    chunks: Vec<String>,
    expires_at: Instant,
}

/// In-process session buffer with lazy TTL expiry
pub struct InMemorySessionBuffer {
    ttl: Duration,
    entries: Mutex<HashMap<String, BufferEntry>>,
}

impl InMemorySessionBuffer {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionBufferStore for InMemorySessionBuffer {
    async fn append(&self, key: &str, chunk: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let entry = entries.entry(key.to_string()).or_insert_with(|| BufferEntry {
            chunks: Vec::new(),
            expires_at: now + self.ttl,
        });
        if entry.expires_at <= now {
            entry.chunks.clear();
        }
        entry.chunks.push(chunk.to_string());
        entry.expires_at = now + self.ttl;
        debug!(key, chunks = entry.chunks.len(), "Buffer chunk appended");
        Ok(())
    }

    async fn range(&self, key: &str) -> Result<Vec<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(entry.chunks.clone()),
            Some(_) => {
                entries.remove(key);
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
