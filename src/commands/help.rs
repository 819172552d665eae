use crate::{Context, Error};

/// Show available commands
#[poise::command(slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(
        "**Commands**\n\
         `/ask question` — ask the knowledge base a question\n\
         `/setup category_id` — owner only: initial guild setup\n\
         `/update category_id` — owner only: update guild information\n\
         `/addrole role_id` — privileged: add a moderator role\n\
         `/fetch channel_id message_id` — privileged: ingest a message\n\
         `/delete message_id` — privileged: purge a message's stored content",
    )
    .await?;
    Ok(())
}
