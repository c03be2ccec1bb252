use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Check your Gumit membership
#[poise::command(slash_command)]
pub async fn gold(ctx: Context<'_>) -> Result<(), Error> {
    let tier = ctx.data().premium.tier(ctx.author().id).await?;
    let reply = if tier.is_premium() {
        format!("💎 <@{}>, you are a confirmed Premium Member.", ctx.author().id)
    } else {
        format!(
            "🔓 <@{}>, you are on the free plan. Premium unlocks AI chat and more triggers.",
            ctx.author().id
        )
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Manage premium members (Owner only)
#[poise::command(
    slash_command,
    subcommands("grant", "revoke"),
    owners_only,
    hide_in_help
)]
pub async fn premium(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Give a user premium
#[poise::command(slash_command, owners_only)]
pub async fn grant(
    ctx: Context<'_>,
    #[description = "User to upgrade"] user: serenity::User,
) -> Result<(), Error> {
    let reply = if ctx.data().premium.grant(user.id).await? {
        format!("👑 <@{}> is now a Premium Member.", user.id)
    } else {
        format!("ℹ️ <@{}> already has premium.", user.id)
    };
    ctx.send(poise::CreateReply::default().content(reply).ephemeral(true))
        .await?;
    Ok(())
}

/// Remove a user's premium
#[poise::command(slash_command, owners_only)]
pub async fn revoke(
    ctx: Context<'_>,
    #[description = "User to downgrade"] user: serenity::User,
) -> Result<(), Error> {
    let reply = if ctx.data().premium.revoke(user.id).await? {
        format!("🗑️ Premium removed from <@{}>.", user.id)
    } else {
        format!("ℹ️ <@{}> did not have premium.", user.id)
    };
    ctx.send(poise::CreateReply::default().content(reply).ephemeral(true))
        .await?;
    Ok(())
}
