use crate::sync::{LifecycleEvent, SourceKind, SyncOutcome};
use crate::{Context, Error};

/// Delete a message's stored content from the knowledge base
#[poise::command(slash_command, guild_only, rename = "delete")]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Message id to purge"] message_id: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let data = ctx.data();

    let parent_id = message_id.clone();
    let chunks = data
        .db
        .run_blocking(move |db| db.documents_for_parent(&parent_id))
        .await?;

    let Some(first) = chunks.first() else {
        ctx.say("No message found.").await?;
        return Ok(());
    };

    let preview: String = first.content.chars().take(200).collect();
    let channel_id = first.channel_id.clone();

    let outcome = data
        .pipeline
        .handle(LifecycleEvent::Deleted {
            kind: SourceKind::Message,
            parent_id: message_id.clone(),
            channel_id,
        })
        .await;

    match outcome {
        Ok(SyncOutcome::Deleted { chunks }) => {
            ctx.say(format!(
                "Message found!\n**Preview:** {}\nDeleted {} stored chunks.",
                preview, chunks
            ))
            .await?;
        }
        Ok(SyncOutcome::Skipped) => {
            ctx.say("That message's channel is not allowlisted for synchronization.")
                .await?;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!("purge failed for {}: {}", message_id, e);
            ctx.say("Failed to delete the stored message.").await?;
        }
    }
    Ok(())
}
