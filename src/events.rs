use crate::mention::{self, is_addressed_to_bot};
use crate::{Context, Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!("Connected as {}", data_about_bot.user.name);
        }
        serenity::FullEvent::Message { new_message } => {
            handle_message(ctx, new_message, data).await;
        }
        _ => {}
    }
    Ok(())
}

/// Every non-bot guild message feeds both the sticky reposter and the
/// trigger engine; neither waits on the other.
async fn handle_message(ctx: &serenity::Context, message: &serenity::Message, data: &Data) {
    if message.author.bot {
        return;
    }
    let Some(guild_id) = message.guild_id else {
        return;
    };

    let (sticky, trigger) = tokio::join!(
        data.sticky.on_channel_activity(message.channel_id),
        data.triggers
            .evaluate(guild_id, message.channel_id, &message.content),
    );
    debug!(
        "Message {} in {}: sticky={:?} trigger={:?}",
        message.id, message.channel_id, sticky, trigger
    );

    if is_addressed_to_bot(message, data.bot_id) {
        if let Err(e) = mention::handle_mention(ctx, message, data).await {
            error!("Error handling mention in {}: {}", message.channel_id, e);
        }
    }
}

async fn reply_ephemeral(ctx: Context<'_>, text: String) {
    let reply = poise::CreateReply::default().content(text).ephemeral(true);
    if let Err(e) = ctx.send(reply).await {
        warn!("Failed to report command error: {}", e);
    }
}

pub async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {:?}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(
                "Error in command `{}`: {:?}",
                ctx.command().qualified_name,
                error
            );
            reply_ephemeral(ctx, "❌ Something went wrong. Please try again later.".to_string())
                .await;
        }
        poise::FrameworkError::MissingUserPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            let text = match missing_permissions {
                Some(perms) => format!("⛔ You need the **{}** permission to use this.", perms),
                None => "⛔ You don't have permission to use this.".to_string(),
            };
            reply_ephemeral(ctx, text).await;
        }
        poise::FrameworkError::MissingBotPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            reply_ephemeral(
                ctx,
                format!("⚠️ I need the **{}** permission here.", missing_permissions),
            )
            .await;
        }
        poise::FrameworkError::CooldownHit {
            remaining_cooldown,
            ctx,
            ..
        } => {
            reply_ephemeral(
                ctx,
                format!(
                    "⏳ **Cooldown:** Wait {:.1}s.",
                    remaining_cooldown.as_secs_f32()
                ),
            )
            .await;
        }
        poise::FrameworkError::NotAnOwner { ctx, .. } => {
            reply_ephemeral(ctx, "🔒 Only the bot owner can do that.".to_string()).await;
        }
        poise::FrameworkError::GuildOnly { ctx, .. } => {
            reply_ephemeral(ctx, "❌ This command only works in a server.".to_string()).await;
        }
        poise::FrameworkError::ArgumentParse { error, ctx, .. } => {
            reply_ephemeral(ctx, format!("❌ Invalid argument: {}", error)).await;
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}
