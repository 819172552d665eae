use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Add a privileged role for this guild
#[poise::command(slash_command, guild_only)]
pub async fn addrole(
    ctx: Context<'_>,
    #[description = "Role id to make privileged"] role_id: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let guild_id = ctx.guild_id().ok_or("addrole used outside a guild")?;

    let Ok(parsed) = role_id.parse::<u64>() else {
        ctx.say("That is not a valid role id.").await?;
        return Ok(());
    };

    // The role must actually exist in this guild before it gates anything.
    let roles = guild_id.roles(ctx.http()).await?;
    if !roles.contains_key(&serenity::RoleId::new(parsed)) {
        ctx.say("Role is not found in this guild.").await?;
        return Ok(());
    }

    if ctx
        .data()
        .moderators
        .add_role(&guild_id.to_string(), &role_id)
        .await?
    {
        ctx.say("Role added.").await?;
    } else {
        ctx.say("Role is already privileged.").await?;
    }
    Ok(())
}
