use crate::config::Config;
use crate::documents::{DocumentChunk, DocumentStore};
use crate::error::EngineError;
use async_trait::async_trait;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// One per guild; created on first `/setup`, updated by `/update`, never
/// deleted programmatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub guild_id: String,
    pub category_id: String,
}

/// At most one active session per `(guild_id, member_id)`; the table's
/// primary key enforces the invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub guild_id: String,
    pub member_id: String,
    pub channel_id: String,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> rusqlite::Result<Self> {
        Self::open(&config.database_url)
    }

    pub fn open(url: &str) -> rusqlite::Result<Self> {
        let conn = Connection::open(url)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let sql = "
            CREATE TABLE IF NOT EXISTS guilds (
                guild_id TEXT PRIMARY KEY,
                category_id TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS chats (
                guild_id TEXT NOT NULL,
                member_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (guild_id, member_id)
            );

            CREATE TABLE IF NOT EXISTS guild_moderators (
                guild_id TEXT NOT NULL,
                role_id TEXT NOT NULL,
                PRIMARY KEY (guild_id, role_id)
            );

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                parent_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                is_attachment BOOLEAN DEFAULT FALSE,
                attachment_id TEXT,
                attachment_name TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents (parent_id);
        ";
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(sql)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Hops blocking sqlite work onto the tokio blocking pool.
    pub async fn run_blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    // --- Guilds ---

    pub fn get_guild(&self, guild_id: &str) -> anyhow::Result<Option<GuildConfig>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT guild_id, category_id FROM guilds WHERE guild_id = ?1")?;
        let mut rows = stmt.query([guild_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(GuildConfig {
                guild_id: row.get(0)?,
                category_id: row.get(1)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Creates guild data once. Returns false when the guild already exists.
    pub fn create_guild(&self, guild_id: &str, category_id: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO guilds (guild_id, category_id) VALUES (?1, ?2)",
            (guild_id, category_id),
        )?;
        Ok(inserted > 0)
    }

    /// Returns false when the guild has not finished setup.
    pub fn update_guild_category(&self, guild_id: &str, category_id: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE guilds SET category_id = ?1 WHERE guild_id = ?2",
            (category_id, guild_id),
        )?;
        Ok(updated > 0)
    }

    // --- Chat sessions ---

    pub fn get_chat(&self, guild_id: &str, member_id: &str) -> anyhow::Result<Option<ChatSession>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT guild_id, member_id, channel_id FROM chats
             WHERE guild_id = ?1 AND member_id = ?2",
        )?;
        let mut rows = stmt.query([guild_id, member_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(ChatSession {
                guild_id: row.get(0)?,
                member_id: row.get(1)?,
                channel_id: row.get(2)?,
            }))
        } else {
            Ok(None)
        }
    }

    pub fn upsert_chat(&self, session: &ChatSession) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO chats (guild_id, member_id, channel_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(guild_id, member_id) DO UPDATE SET channel_id = excluded.channel_id",
            (&session.guild_id, &session.member_id, &session.channel_id),
        )?;
        Ok(())
    }

    // --- Moderator roles ---

    pub fn get_moderator_roles(&self, guild_id: &str) -> anyhow::Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT role_id FROM guild_moderators WHERE guild_id = ?1 ORDER BY role_id")?;
        let rows = stmt.query_map([guild_id], |row| row.get(0))?;

        let mut roles = Vec::new();
        for row in rows {
            roles.push(row?);
        }
        Ok(roles)
    }

    /// Returns false when the role was already assigned.
    pub fn add_moderator_role(&self, guild_id: &str, role_id: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO guild_moderators (guild_id, role_id) VALUES (?1, ?2)",
            (guild_id, role_id),
        )?;
        Ok(inserted > 0)
    }

    // --- Documents ---

    pub fn upsert_documents(&self, chunks: &[DocumentChunk]) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for chunk in chunks {
            tx.execute(
                "INSERT INTO documents
                     (id, parent_id, channel_id, content, embedding,
                      is_attachment, attachment_id, attachment_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     parent_id = excluded.parent_id,
                     channel_id = excluded.channel_id,
                     content = excluded.content,
                     embedding = excluded.embedding,
                     is_attachment = excluded.is_attachment,
                     attachment_id = excluded.attachment_id,
                     attachment_name = excluded.attachment_name",
                (
                    &chunk.id,
                    &chunk.parent_id,
                    &chunk.channel_id,
                    &chunk.content,
                    encode_embedding(&chunk.embedding),
                    chunk.is_attachment,
                    &chunk.attachment_id,
                    &chunk.attachment_name,
                ),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete_documents_by_parent(&self, parent_id: &str) -> anyhow::Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM documents WHERE parent_id = ?1", (parent_id,))?;
        Ok(deleted)
    }

    pub fn documents_for_parent(&self, parent_id: &str) -> anyhow::Result<Vec<DocumentChunk>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, channel_id, content, embedding,
                    is_attachment, attachment_id, attachment_name
             FROM documents WHERE parent_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map([parent_id], row_to_chunk)?;

        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row?);
        }
        Ok(chunks)
    }

    /// Brute-force cosine ranking over all stored chunks. Rows are scanned
    /// in rowid order and sorted with a stable sort, so equal scores keep
    /// insertion order.
    pub fn search_documents(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> anyhow::Result<Vec<DocumentChunk>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, channel_id, content, embedding,
                    is_attachment, attachment_id, attachment_name
             FROM documents ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], row_to_chunk)?;

        let mut scored: Vec<(f32, DocumentChunk)> = Vec::new();
        for row in rows {
            let chunk = row?;
            let score = cosine_similarity(embedding, &chunk.embedding);
            scored.push((score, chunk));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        debug!("Database: similarity search returned {} chunks", scored.len());
        Ok(scored.into_iter().map(|(_, chunk)| chunk).collect())
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn upsert_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<(), EngineError> {
        self.run_blocking(move |db| db.upsert_documents(&chunks))
            .await
            .map_err(EngineError::upstream)
    }

    async fn delete_by_parent(&self, parent_id: &str) -> Result<usize, EngineError> {
        let parent_id = parent_id.to_string();
        self.run_blocking(move |db| db.delete_documents_by_parent(&parent_id))
            .await
            .map_err(EngineError::upstream)
    }

    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<DocumentChunk>, EngineError> {
        let embedding = embedding.to_vec();
        self.run_blocking(move |db| db.search_documents(&embedding, k))
            .await
            .map_err(EngineError::upstream)
    }

    async fn chunks_for_parent(&self, parent_id: &str) -> Result<Vec<DocumentChunk>, EngineError> {
        let parent_id = parent_id.to_string();
        self.run_blocking(move |db| db.documents_for_parent(&parent_id))
            .await
            .map_err(EngineError::upstream)
    }
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentChunk> {
    let blob: Vec<u8> = row.get(4)?;
    Ok(DocumentChunk {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        channel_id: row.get(2)?,
        content: row.get(3)?,
        embedding: decode_embedding(&blob),
        is_attachment: row.get(5)?,
        attachment_id: row.get(6)?,
        attachment_name: row.get(7)?,
    })
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
