pub mod cache;
pub mod chunker;
pub mod commands;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod events;
pub mod llm;
pub mod permission;
pub mod rag;
pub mod services;
pub mod sync;

use std::sync::Arc;

/// Custom data passed to all commands: the typed module registry, resolved
/// once at composition time.
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub cache: cache::Cache,
    pub permission: Arc<permission::PermissionPolicy>,
    pub pipeline: Arc<sync::SyncPipeline>,
    pub knowledge: Arc<rag::KnowledgeBase>,
    pub guilds: services::GuildService,
    pub sessions: services::SessionService,
    pub moderators: services::ModeratorService,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
