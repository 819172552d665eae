use crate::cache::{Cache, SetOptions, GUILD_PREFIX};
use crate::db::{Database, GuildConfig};
use tracing::warn;

#[derive(Debug, PartialEq, Eq)]
pub enum SetupOutcome {
    Created,
    AlreadyConfigured,
}

#[derive(Clone)]
pub struct GuildService {
    db: Database,
    cache: Cache,
}

impl GuildService {
    pub fn new(db: Database, cache: Cache) -> Self {
        Self { db, cache }
    }

    fn key(guild_id: &str) -> String {
        format!("{}{}", GUILD_PREFIX, guild_id)
    }

    pub async fn get(&self, guild_id: &str) -> anyhow::Result<Option<GuildConfig>> {
        let key = Self::key(guild_id);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<GuildConfig>(&raw) {
                Ok(config) => return Ok(Some(config)),
                Err(e) => warn!("discarding undecodable cached guild config: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!("guild cache read failed, using store: {}", e),
        }

        let guild_id_owned = guild_id.to_string();
        let config = self
            .db
            .run_blocking(move |db| db.get_guild(&guild_id_owned))
            .await?;

        if let Some(config) = &config {
            if let Ok(raw) = serde_json::to_string(config) {
                if let Err(e) = self.cache.set(&key, &raw, SetOptions::default()).await {
                    warn!("guild cache populate failed: {}", e);
                }
            }
        }
        Ok(config)
    }

    /// Creates the guild record once. The cache key is invalidated in the
    /// same logical operation as the store write.
    pub async fn setup(&self, guild_id: &str, category_id: &str) -> anyhow::Result<SetupOutcome> {
        let guild_id_owned = guild_id.to_string();
        let category_id = category_id.to_string();
        let created = self
            .db
            .run_blocking(move |db| db.create_guild(&guild_id_owned, &category_id))
            .await?;

        self.invalidate(guild_id).await;
        Ok(if created {
            SetupOutcome::Created
        } else {
            SetupOutcome::AlreadyConfigured
        })
    }

    /// Returns false when the guild has not finished setup.
    pub async fn update_category(
        &self,
        guild_id: &str,
        category_id: &str,
    ) -> anyhow::Result<bool> {
        let guild_id_owned = guild_id.to_string();
        let category_id = category_id.to_string();
        let updated = self
            .db
            .run_blocking(move |db| db.update_guild_category(&guild_id_owned, &category_id))
            .await?;

        self.invalidate(guild_id).await;
        Ok(updated)
    }

    async fn invalidate(&self, guild_id: &str) {
        if let Err(e) = self.cache.del(&Self::key(guild_id)).await {
            // A skipped invalidation would be a stale-read window, so it is
            // at least loud.
            warn!("guild cache invalidation failed for {}: {}", guild_id, e);
        }
    }
}
