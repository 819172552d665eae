use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::db::ChatSession;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::{error, info};

/// Ask the knowledge base a question
#[poise::command(slash_command, guild_only)]
pub async fn ask(
    ctx: Context<'_>,
    #[description = "Please insert your question"] question: String,
) -> Result<(), Error> {
    ctx.defer().await?;

    let data = ctx.data();
    let guild_id = ctx.guild_id().ok_or("ask used outside a guild")?.to_string();
    let member_id = ctx.author().id.to_string();
    info!("{} used ask command in guild {}", member_id, guild_id);

    let Some(guild) = data.guilds.get(&guild_id).await? else {
        ctx.say("This guild has not finished initial setup. Please use `/setup` first.")
            .await?;
        return Ok(());
    };

    let session = data.sessions.get(&guild_id, &member_id).await?;

    let current_channel = ctx.channel_id().to_string();
    let in_session_channel = session
        .as_ref()
        .is_some_and(|s| s.channel_id == current_channel);
    if !in_session_channel && !data.permission.is_chat_channel(&current_channel) {
        ctx.say("Please ask your questions in a chat-enabled channel.")
            .await?;
        return Ok(());
    }

    // Scoped by guild so identical questions in different guilds do not
    // share cached results.
    let answer = match data.knowledge.answer(&question, Some(&guild_id)).await {
        Ok(answer) => {
            info!("answered with {} grounding chunks", answer.context.len());
            answer
        }
        Err(e) => {
            error!("ask failed for {}: {}", member_id, e);
            ctx.say("Something went wrong while answering your question. Please try again.")
                .await?;
            return Ok(());
        }
    };

    let channel_id = match &session {
        Some(session) => serenity::ChannelId::new(session.channel_id.parse()?),
        None => {
            let channel = create_chat_channel(&ctx, &guild.category_id).await?;
            data.sessions
                .create(ChatSession {
                    guild_id: guild_id.clone(),
                    member_id: member_id.clone(),
                    channel_id: channel.id.to_string(),
                })
                .await?;
            channel.id
        }
    };

    let content = clamp(&format!("<@{}> {}", member_id, answer.answer));
    if channel_id == ctx.channel_id() {
        ctx.say(content).await?;
    } else {
        channel_id.say(ctx.http(), content).await?;
        ctx.say(format!("Answered in <#{}>.", channel_id)).await?;
    }
    Ok(())
}

/// Creates the member's private chat channel under the configured category:
/// visible to the member and the bot, hidden from everyone else.
async fn create_chat_channel(
    ctx: &Context<'_>,
    category_id: &str,
) -> Result<serenity::GuildChannel, Error> {
    let guild_id = ctx.guild_id().ok_or("ask used outside a guild")?;
    let category = serenity::ChannelId::new(category_id.parse()?);
    let everyone = serenity::RoleId::new(guild_id.get());
    let bot_id = ctx.framework().bot_id;

    let overwrites = vec![
        serenity::PermissionOverwrite {
            allow: serenity::Permissions::empty(),
            deny: serenity::Permissions::VIEW_CHANNEL,
            kind: serenity::PermissionOverwriteType::Role(everyone),
        },
        serenity::PermissionOverwrite {
            allow: serenity::Permissions::VIEW_CHANNEL,
            deny: serenity::Permissions::empty(),
            kind: serenity::PermissionOverwriteType::Member(ctx.author().id),
        },
        serenity::PermissionOverwrite {
            allow: serenity::Permissions::VIEW_CHANNEL,
            deny: serenity::Permissions::empty(),
            kind: serenity::PermissionOverwriteType::Member(bot_id),
        },
    ];

    let builder = serenity::CreateChannel::new(format!("chat-{}", ctx.author().name))
        .kind(serenity::ChannelType::Text)
        .category(category)
        .permissions(overwrites);

    let channel = guild_id.create_channel(ctx.http(), builder).await?;
    Ok(channel)
}

fn clamp(content: &str) -> String {
    content.chars().take(DISCORD_MESSAGE_LIMIT).collect()
}
