use crate::cache::{Cache, SetOptions, CHAT_PREFIX};
use crate::db::{ChatSession, Database};
use tracing::warn;

#[derive(Clone)]
pub struct SessionService {
    db: Database,
    cache: Cache,
}

impl SessionService {
    pub fn new(db: Database, cache: Cache) -> Self {
        Self { db, cache }
    }

    // Scoped by guild and member: a member's sessions in two guilds must
    // never alias each other.
    fn key(guild_id: &str, member_id: &str) -> String {
        format!("{}{}:{}", CHAT_PREFIX, guild_id, member_id)
    }

    pub async fn get(
        &self,
        guild_id: &str,
        member_id: &str,
    ) -> anyhow::Result<Option<ChatSession>> {
        let key = Self::key(guild_id, member_id);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<ChatSession>(&raw) {
                Ok(session) => return Ok(Some(session)),
                Err(e) => warn!("discarding undecodable cached chat session: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!("chat cache read failed, using store: {}", e),
        }

        let guild_id_owned = guild_id.to_string();
        let member_id_owned = member_id.to_string();
        let session = self
            .db
            .run_blocking(move |db| db.get_chat(&guild_id_owned, &member_id_owned))
            .await?;

        if let Some(session) = &session {
            if let Ok(raw) = serde_json::to_string(session) {
                if let Err(e) = self.cache.set(&key, &raw, SetOptions::default()).await {
                    warn!("chat cache populate failed: {}", e);
                }
            }
        }
        Ok(session)
    }

    /// Creates or repoints the member's session. The cache entry is
    /// overwritten in the same logical operation, so a subsequent read never
    /// sees the pre-mutation channel.
    pub async fn create(&self, session: ChatSession) -> anyhow::Result<()> {
        let stored = session.clone();
        self.db
            .run_blocking(move |db| db.upsert_chat(&stored))
            .await?;

        let key = Self::key(&session.guild_id, &session.member_id);
        match serde_json::to_string(&session) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(&key, &raw, SetOptions::default()).await {
                    warn!("chat cache overwrite failed for {}: {}", key, e);
                    // Leave no stale entry behind if the overwrite failed.
                    let _ = self.cache.del(&key).await;
                }
            }
            Err(_) => {
                let _ = self.cache.del(&key).await;
            }
        }
        Ok(())
    }
}
