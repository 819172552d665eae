use lorekeeper::cache::{Cache, MemoryCache};
use lorekeeper::chunker::TextChunker;
use lorekeeper::commands::{ask, guild, help, ingest, purge, roles};
use lorekeeper::config::Config;
use lorekeeper::db::Database;
use lorekeeper::documents::DocumentStore;
use lorekeeper::llm::{Embedder, Generator, LlmClient};
use lorekeeper::permission::PermissionPolicy;
use lorekeeper::rag::KnowledgeBase;
use lorekeeper::services::{GuildService, ModeratorService, SessionService};
use lorekeeper::sync::SyncPipeline;
use lorekeeper::{events, Data};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    let discord_token = config.discord_token.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                ask::ask(),
                guild::setup(),
                guild::update(),
                roles::addrole(),
                ingest::fetch(),
                purge::delete(),
                help::help(),
            ],
            // Every command goes through the permission evaluator before it
            // dispatches; denial is a reply, not an error.
            command_check: Some(|ctx| Box::pin(command_check(ctx))),
            event_handler: |ctx, event, _framework, data| {
                Box::pin(events::dispatch(ctx, event, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                ctx.set_activity(Some(serenity::ActivityData::custom(
                    config.status_message.clone(),
                )));
                build_data(config)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    // Close the gateway connection on ctrl-c; in-flight handlers finish or
    // are abandoned, and each item's batch is a single store write.
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, closing gateway connection...");
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

/// Wires the process-wide singletons and the typed module registry.
fn build_data(config: Config) -> Result<Data, lorekeeper::Error> {
    let db = Database::new(&config)?;
    db.execute_init()?;

    let llm = Arc::new(LlmClient::new(&config));
    let embedder: Arc<dyn Embedder> = llm.clone();
    let generator: Arc<dyn Generator> = llm.clone();
    let documents: Arc<dyn DocumentStore> = Arc::new(db.clone());

    let permission = Arc::new(PermissionPolicy::new(
        config.allowed_channels.clone(),
        config.chat_channels.clone(),
        config.owner_commands.clone(),
        config.privileged_commands.clone(),
    ));

    let cache = Cache::new(
        Arc::new(MemoryCache::new(config.cache_capacity)),
        embedder.clone(),
        documents.clone(),
        config.query_cache_ttl_secs,
    );

    let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap)?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.attachment_timeout_secs))
        .build()?;
    let pipeline = Arc::new(SyncPipeline::new(
        chunker,
        embedder,
        documents,
        permission.clone(),
        http,
    ));

    let knowledge = Arc::new(KnowledgeBase::new(
        cache.clone(),
        generator,
        config.retrieval_k,
    ));
    let guilds = GuildService::new(db.clone(), cache.clone());
    let sessions = SessionService::new(db.clone(), cache.clone());
    let moderators = ModeratorService::new(db.clone(), cache.clone());

    Ok(Data {
        config,
        db,
        cache,
        permission,
        pipeline,
        knowledge,
        guilds,
        sessions,
        moderators,
    })
}

/// Pre-dispatch permission gate. The moderator role set comes through the
/// read-through cache, refreshed from the store when absent.
async fn command_check(ctx: lorekeeper::Context<'_>) -> Result<bool, lorekeeper::Error> {
    let data = ctx.data();
    let command = ctx.command().name.as_str();

    if !data.permission.is_owner_command(command) && !data.permission.is_privileged_command(command)
    {
        return Ok(true);
    }

    let Some(guild_id) = ctx.guild_id() else {
        ctx.say("This command can only be used in a guild.").await?;
        return Ok(false);
    };

    let owner_id = ctx
        .partial_guild()
        .await
        .map(|guild| guild.owner_id.to_string())
        .unwrap_or_default();
    let member_roles: Vec<String> = ctx
        .author_member()
        .await
        .map(|member| member.roles.iter().map(|role| role.to_string()).collect())
        .unwrap_or_default();
    let moderator_roles = data.moderators.roles(&guild_id.to_string()).await?;

    let allowed = data.permission.has_permission(
        &ctx.author().id.to_string(),
        &member_roles,
        command,
        &moderator_roles,
        &owner_id,
    );
    if !allowed {
        ctx.say("You are not allowed to use this command.").await?;
    }
    Ok(allowed)
}
