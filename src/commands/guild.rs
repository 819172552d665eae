use crate::services::SetupOutcome;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Set up guild information
#[poise::command(slash_command, guild_only)]
pub async fn setup(
    ctx: Context<'_>,
    #[description = "Category channel id to host member chats"] category_id: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let guild_id = ctx.guild_id().ok_or("setup used outside a guild")?.to_string();
    info!("setup command executed by {} in guild {}", ctx.author().id, guild_id);

    if !is_category(&ctx, &category_id).await {
        ctx.say("You have selected a wrong type of channel. **Expected:** `Category` channel.")
            .await?;
        return Ok(());
    }

    match ctx.data().guilds.setup(&guild_id, &category_id).await? {
        SetupOutcome::Created => {
            ctx.say("You have finished initial setup for this guild.")
                .await?;
        }
        SetupOutcome::AlreadyConfigured => {
            ctx.say("This guild is already set up. **Please use `/update` to change the guild information.**")
                .await?;
        }
    }
    Ok(())
}

/// Update guild information
#[poise::command(slash_command, guild_only)]
pub async fn update(
    ctx: Context<'_>,
    #[description = "Category channel id to host member chats"] category_id: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let guild_id = ctx.guild_id().ok_or("update used outside a guild")?.to_string();
    info!("update command executed by {} in guild {}", ctx.author().id, guild_id);

    if !is_category(&ctx, &category_id).await {
        ctx.say("You have selected a wrong type of channel. **Expected:** `Category` channel.")
            .await?;
        return Ok(());
    }

    if ctx.data().guilds.update_category(&guild_id, &category_id).await? {
        ctx.say("You have updated this guild information.").await?;
    } else {
        ctx.say("This guild has not finished initial setup. Please use `/setup` first.")
            .await?;
    }
    Ok(())
}

async fn is_category(ctx: &Context<'_>, channel_id: &str) -> bool {
    let Ok(id) = channel_id.parse::<u64>() else {
        return false;
    };
    match serenity::ChannelId::new(id).to_channel(ctx.serenity_context()).await {
        Ok(serenity::Channel::Guild(channel)) => channel.kind == serenity::ChannelType::Category,
        _ => false,
    }
}
