use crate::error::EngineError;
use dotenvy::dotenv;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub openai_url: String,
    pub openai_api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub database_url: String,
    pub status_message: String,

    // Chunker settings
    pub chunk_size: usize,
    pub chunk_overlap: usize,

    // Retrieval settings
    pub retrieval_k: usize,
    pub query_cache_ttl_secs: u64,
    pub cache_capacity: usize,

    // Channel & command gating, consumed by the permission evaluator
    // and the synchronization pipeline at construction time.
    pub allowed_channels: Vec<String>,
    pub chat_channels: Vec<String>,
    pub owner_commands: Vec<String>,
    pub privileged_commands: Vec<String>,

    pub attachment_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            openai_url: env::var("OPENAI_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            chat_model: env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/lorekeeper.db".to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Keeping the lore.".to_string()),
            chunk_size: env::var("CHUNK_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            chunk_overlap: env::var("CHUNK_OVERLAP")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .unwrap_or(200),
            retrieval_k: env::var("RETRIEVAL_K")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            query_cache_ttl_secs: env::var("QUERY_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            cache_capacity: env::var("CACHE_CAPACITY")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .unwrap_or(1024),
            allowed_channels: parse_list(env::var("ALLOWED_CHANNELS").ok()),
            chat_channels: parse_list(env::var("CHAT_CHANNELS").ok()),
            owner_commands: parse_list(Some(
                env::var("OWNER_COMMANDS").unwrap_or_else(|_| "setup,update".to_string()),
            )),
            privileged_commands: parse_list(Some(
                env::var("PRIVILEGED_COMMANDS")
                    .unwrap_or_else(|_| "fetch,delete,addrole".to_string()),
            )),
            attachment_timeout_secs: env::var("ATTACHMENT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        })
    }

    /// Rejects configurations the engine cannot run with. Called once at
    /// startup; a violation here is fatal, never a per-call error.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chunk_size == 0 {
            return Err(EngineError::Config("CHUNK_SIZE must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(EngineError::Config(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.retrieval_k == 0 {
            return Err(EngineError::Config("RETRIEVAL_K must be positive".into()));
        }
        if self.cache_capacity == 0 {
            return Err(EngineError::Config(
                "CACHE_CAPACITY must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("openai_url", &self.openai_url)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("database_url", &self.database_url)
            .field("status_message", &self.status_message)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("retrieval_k", &self.retrieval_k)
            .field("query_cache_ttl_secs", &self.query_cache_ttl_secs)
            .field("cache_capacity", &self.cache_capacity)
            .field("allowed_channels", &self.allowed_channels)
            .field("chat_channels", &self.chat_channels)
            .field("owner_commands", &self.owner_commands)
            .field("privileged_commands", &self.privileged_commands)
            .field("attachment_timeout_secs", &self.attachment_timeout_secs)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        // 1. Missing required vars
        env::remove_var("DISCORD_TOKEN");
        let result = Config::build();
        assert!(result.is_err(), "Should fail when DISCORD_TOKEN is missing");

        // 2. Defaults
        env::set_var("DISCORD_TOKEN", "test_token");
        env::set_var("ALLOWED_CHANNELS", "111, 222,333,");
        let config = Config::build().unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.retrieval_k, 4);
        assert_eq!(config.allowed_channels, vec!["111", "222", "333"]);
        assert!(config.owner_commands.contains(&"setup".to_string()));
        assert!(config.validate().is_ok());

        // 3. Validation rejects overlap >= size
        let mut bad = config.clone();
        bad.chunk_overlap = bad.chunk_size;
        assert!(bad.validate().is_err());

        // 4. Debug redaction
        env::set_var("OPENAI_API_KEY", "secret_api_key");
        let redacted = Config::build().unwrap();
        let debug_output = format!("{:?}", redacted);
        assert!(!debug_output.contains("test_token"));
        assert!(!debug_output.contains("secret_api_key"));
        assert!(debug_output.contains("[REDACTED]"));

        // Cleanup
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("ALLOWED_CHANNELS");
        env::remove_var("OPENAI_API_KEY");
    }
}
