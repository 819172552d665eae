use crate::chunker::TextChunker;
use crate::documents::{chunk_id, DocumentChunk, DocumentStore};
use crate::error::EngineError;
use crate::llm::Embedder;
use crate::permission::PermissionPolicy;
use futures_util::future::try_join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// What a lifecycle event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Message,
    Thread,
}

/// A plain-text attachment reference on a source message.
#[derive(Debug, Clone)]
pub struct AttachmentRef {
    pub id: String,
    pub name: String,
    pub url: String,
    pub content_type: Option<String>,
}

impl AttachmentRef {
    pub fn is_plain_text(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|mime| mime.trim() == "text/plain")
            .unwrap_or(false)
    }
}

/// The provenance of one or more chunks: a message or a thread's root
/// message, already resolved to plain content by the event layer.
#[derive(Debug, Clone)]
pub struct SourceItem {
    pub kind: SourceKind,
    pub parent_id: String,
    pub channel_id: String,
    pub content: String,
    pub attachments: Vec<AttachmentRef>,
}

/// External content lifecycle, as a single tagged dispatch type.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Created(SourceItem),
    Edited(SourceItem),
    Deleted {
        kind: SourceKind,
        parent_id: String,
        channel_id: String,
    },
}

impl LifecycleEvent {
    pub fn parent_id(&self) -> &str {
        match self {
            Self::Created(item) | Self::Edited(item) => &item.parent_id,
            Self::Deleted { parent_id, .. } => parent_id,
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            Self::Created(item) | Self::Edited(item) => &item.channel_id,
            Self::Deleted { channel_id, .. } => channel_id,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Created(_) => "create",
            Self::Edited(_) => "edit",
            Self::Deleted { .. } => "delete",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Channel not allowlisted; nothing was touched.
    Skipped,
    Stored { chunks: usize },
    Deleted { chunks: usize },
}

/// Per-key async mutexes. Operations scoped to the same `parent_id` are
/// serialized; independent keys share nothing.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl KeyedLocks {
    pub async fn acquire(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap();
            // Held or pending locks keep an extra Arc alive; everything else
            // is stale and can go.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Drives chunk → embed → store/delete for content lifecycle events,
/// keeping the document store consistent with the live conversation.
pub struct SyncPipeline {
    chunker: TextChunker,
    embedder: Arc<dyn Embedder>,
    documents: Arc<dyn DocumentStore>,
    permission: Arc<PermissionPolicy>,
    http: reqwest::Client,
    locks: KeyedLocks,
}

impl SyncPipeline {
    pub fn new(
        chunker: TextChunker,
        embedder: Arc<dyn Embedder>,
        documents: Arc<dyn DocumentStore>,
        permission: Arc<PermissionPolicy>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            chunker,
            embedder,
            documents,
            permission,
            http,
            locks: KeyedLocks::default(),
        }
    }

    /// Single dispatch point for all lifecycle events.
    ///
    /// Events for channels outside the allowlist are a silent no-op. The
    /// rest runs under the per-`parent_id` lock: an edit arriving while a
    /// create for the same id is in flight waits its turn.
    pub async fn handle(&self, event: LifecycleEvent) -> Result<SyncOutcome, EngineError> {
        if !self.permission.is_allowed_channel(event.channel_id()) {
            debug!(
                "ignoring {} event for non-allowlisted channel {}",
                event.name(),
                event.channel_id()
            );
            return Ok(SyncOutcome::Skipped);
        }

        let _guard = self.locks.acquire(event.parent_id()).await;

        match event {
            LifecycleEvent::Created(item) => self.ingest(&item).await,
            LifecycleEvent::Edited(item) => {
                // Delete-then-insert is mandatory: inserting first would
                // leave duplicate or stale chunks behind a failed delete.
                let removed = self.documents.delete_by_parent(&item.parent_id).await?;
                debug!("removed {} stale chunks for edited {}", removed, item.parent_id);

                match self.ingest(&item).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => {
                        // The old chunks are gone and the new ones did not
                        // land. The item is left empty and detectable, not
                        // silently stale.
                        error!(
                            "{}",
                            EngineError::Consistency {
                                parent_id: item.parent_id.clone(),
                                detail: format!("delete succeeded but re-insert failed: {}", e),
                            }
                        );
                        Err(e)
                    }
                }
            }
            LifecycleEvent::Deleted { parent_id, .. } => {
                let removed = self.documents.delete_by_parent(&parent_id).await?;
                info!("deleted {} chunks for removed source {}", removed, parent_id);
                Ok(SyncOutcome::Deleted { chunks: removed })
            }
        }
    }

    /// Creation path: chunk the content and any plain-text attachments,
    /// embed every chunk, then land the whole item as one batch.
    async fn ingest(&self, item: &SourceItem) -> Result<SyncOutcome, EngineError> {
        let mut rows = Vec::new();
        let mut next_index = 0;

        self.append_chunks(&mut rows, &mut next_index, &item.content, item, None)
            .await?;

        for attachment in &item.attachments {
            if !attachment.is_plain_text() {
                continue;
            }
            let text = match self.fetch_attachment(attachment).await {
                Ok(text) => text,
                Err(e) => {
                    // A bad attachment skips only itself, never the batch.
                    warn!(
                        "skipping attachment {} ({}) on {}: {}",
                        attachment.id, attachment.name, item.parent_id, e
                    );
                    continue;
                }
            };
            self.append_chunks(&mut rows, &mut next_index, &text, item, Some(attachment))
                .await?;
        }

        if rows.is_empty() {
            debug!("no chunkable content for {}", item.parent_id);
            return Ok(SyncOutcome::Stored { chunks: 0 });
        }

        let count = rows.len();
        self.documents.upsert_chunks(rows).await?;
        info!("document chunks from {} have been stored ({})", item.parent_id, count);
        Ok(SyncOutcome::Stored { chunks: count })
    }

    /// Embeds all chunks of one text concurrently. A single embedding
    /// failure fails the whole call, which aborts this item's batch only.
    async fn append_chunks(
        &self,
        rows: &mut Vec<DocumentChunk>,
        next_index: &mut usize,
        text: &str,
        item: &SourceItem,
        attachment: Option<&AttachmentRef>,
    ) -> Result<(), EngineError> {
        let pieces = self.chunker.split(text);
        let embeddings =
            try_join_all(pieces.iter().map(|piece| self.embedder.embed(piece))).await?;

        for (piece, embedding) in pieces.into_iter().zip(embeddings) {
            rows.push(DocumentChunk {
                id: chunk_id(&item.parent_id, *next_index),
                parent_id: item.parent_id.clone(),
                channel_id: item.channel_id.clone(),
                content: piece,
                embedding,
                is_attachment: attachment.is_some(),
                attachment_id: attachment.map(|a| a.id.clone()),
                attachment_name: attachment.map(|a| a.name.clone()),
            });
            *next_index += 1;
        }
        Ok(())
    }

    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<String, EngineError> {
        let response = self
            .http
            .get(&attachment.url)
            .send()
            .await
            .map_err(EngineError::upstream)?
            .error_for_status()
            .map_err(EngineError::upstream)?;
        response.text().await.map_err(EngineError::upstream)
    }
}
