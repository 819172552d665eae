use crate::sync::{AttachmentRef, LifecycleEvent, SourceItem, SourceKind, SyncOutcome};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Fetch a message and feed it to the knowledge base
#[poise::command(slash_command, guild_only)]
pub async fn fetch(
    ctx: Context<'_>,
    #[description = "Thread or text channel containing the message"] channel_id: String,
    #[description = "Message id to ingest"] message_id: String,
) -> Result<(), Error> {
    ctx.defer().await?;

    let Ok(channel) = channel_id.parse::<u64>() else {
        ctx.say("That is not a valid channel id.").await?;
        return Ok(());
    };
    let Ok(message) = message_id.parse::<u64>() else {
        ctx.say("That is not a valid message id.").await?;
        return Ok(());
    };

    let channel = match serenity::ChannelId::new(channel)
        .to_channel(ctx.serenity_context())
        .await
    {
        Ok(serenity::Channel::Guild(channel)) => channel,
        _ => {
            ctx.say("Failed to fetch channel data.").await?;
            return Ok(());
        }
    };

    // Threads are synchronized under their parent channel; plain text
    // channels under themselves. Anything else is not ingestible.
    let sync_channel = match channel.kind {
        serenity::ChannelType::PublicThread | serenity::ChannelType::PrivateThread => channel
            .parent_id
            .map(|id| id.to_string())
            .unwrap_or_default(),
        serenity::ChannelType::Text => channel.id.to_string(),
        _ => {
            ctx.say("You have selected the wrong type of channel. Fetch only accepts a thread or text channel.")
                .await?;
            return Ok(());
        }
    };

    let message = match channel
        .id
        .message(ctx.http(), serenity::MessageId::new(message))
        .await
    {
        Ok(message) => message,
        Err(_) => {
            ctx.say("Selected message is not found.").await?;
            return Ok(());
        }
    };

    info!("fetch command ingesting message {}", message.id);
    let item = SourceItem {
        kind: SourceKind::Message,
        parent_id: message.id.to_string(),
        channel_id: sync_channel,
        content: message.content.clone(),
        attachments: message
            .attachments
            .iter()
            .map(|attachment| AttachmentRef {
                id: attachment.id.to_string(),
                name: attachment.filename.clone(),
                url: attachment.url.clone(),
                content_type: attachment.content_type.clone(),
            })
            .collect(),
    };

    match ctx.data().pipeline.handle(LifecycleEvent::Created(item)).await {
        Ok(SyncOutcome::Stored { chunks }) => {
            ctx.say(format!("Fetch succeeded: {} chunks stored.", chunks))
                .await?;
        }
        Ok(SyncOutcome::Skipped) => {
            ctx.say("That channel is not allowlisted for synchronization.")
                .await?;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!("fetch ingestion failed: {}", e);
            ctx.say("Failed to ingest the selected message.").await?;
        }
    }
    Ok(())
}
