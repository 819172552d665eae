use crate::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One stored text window produced by the chunker from a source message or
/// attachment. `id` is `"{parent_id}_chunk_{index}"` with the index running
/// across the message's own chunks and its attachment chunks, so every row
/// of one source item has a distinct, deterministic id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub parent_id: String,
    pub channel_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub is_attachment: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attachment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attachment_name: Option<String>,
}

pub fn chunk_id(parent_id: &str, index: usize) -> String {
    format!("{}_chunk_{}", parent_id, index)
}

/// Persistence contract for document chunks. The sqlite-backed [`Database`]
/// implements it in production; tests substitute recording stores.
///
/// [`Database`]: crate::db::Database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts or replaces chunks by id. Re-delivering the same batch is a
    /// no-op in effect, which is what makes re-processed creation events
    /// idempotent.
    async fn upsert_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<(), EngineError>;

    /// Removes every chunk whose `parent_id` matches. Returns the number of
    /// rows removed; deleting an unknown parent is zero, not an error.
    async fn delete_by_parent(&self, parent_id: &str) -> Result<usize, EngineError>;

    /// Nearest-neighbor search over stored embeddings. Results are ranked
    /// best-first; equal scores keep insertion order.
    async fn search(&self, embedding: &[f32], k: usize)
        -> Result<Vec<DocumentChunk>, EngineError>;

    /// Fetches chunks for one parent, insertion-ordered. Used by the purge
    /// command for its found/not-found preview.
    async fn chunks_for_parent(&self, parent_id: &str)
        -> Result<Vec<DocumentChunk>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(chunk_id("12345", 0), "12345_chunk_0");
        assert_eq!(chunk_id("12345", 7), "12345_chunk_7");
    }

    #[test]
    fn test_chunk_serialization_omits_empty_fields() {
        let chunk = DocumentChunk {
            id: "m_chunk_0".into(),
            parent_id: "m".into(),
            channel_id: "c".into(),
            content: "hello".into(),
            embedding: Vec::new(),
            is_attachment: false,
            attachment_id: None,
            attachment_name: None,
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(!json.contains("attachment_id"));
        assert!(!json.contains("is_attachment"));
        assert!(!json.contains("embedding"));

        let back: DocumentChunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chunk);
    }
}
