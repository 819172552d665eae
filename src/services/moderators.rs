use crate::cache::{Cache, SetOptions, ROLES_PREFIX};
use crate::db::Database;
use tracing::warn;

#[derive(Clone)]
pub struct ModeratorService {
    db: Database,
    cache: Cache,
}

impl ModeratorService {
    pub fn new(db: Database, cache: Cache) -> Self {
        Self { db, cache }
    }

    fn key(guild_id: &str) -> String {
        format!("{}{}", ROLES_PREFIX, guild_id)
    }

    /// The guild's moderator role set, cached as a comma-joined string.
    pub async fn roles(&self, guild_id: &str) -> anyhow::Result<Vec<String>> {
        let key = Self::key(guild_id);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => {
                return Ok(raw
                    .split(',')
                    .map(|role| role.to_string())
                    .filter(|role| !role.is_empty())
                    .collect());
            }
            Ok(None) => {}
            Err(e) => warn!("roles cache read failed, using store: {}", e),
        }

        let guild_id_owned = guild_id.to_string();
        let roles = self
            .db
            .run_blocking(move |db| db.get_moderator_roles(&guild_id_owned))
            .await?;

        if !roles.is_empty() {
            if let Err(e) = self
                .cache
                .set(&key, &roles.join(","), SetOptions::default())
                .await
            {
                warn!("roles cache populate failed: {}", e);
            }
        }
        Ok(roles)
    }

    /// Assigns a moderator role and invalidates the cached set in the same
    /// logical operation. Returns false when the role was already assigned.
    pub async fn add_role(&self, guild_id: &str, role_id: &str) -> anyhow::Result<bool> {
        let guild_id_owned = guild_id.to_string();
        let role_id = role_id.to_string();
        let added = self
            .db
            .run_blocking(move |db| db.add_moderator_role(&guild_id_owned, &role_id))
            .await?;

        if let Err(e) = self.cache.del(&Self::key(guild_id)).await {
            warn!("roles cache invalidation failed for {}: {}", guild_id, e);
        }
        Ok(added)
    }
}
