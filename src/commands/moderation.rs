use crate::sink::SinkError;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use serenity::{
    ButtonStyle, ComponentInteractionCollector, CreateActionRow, CreateButton, CreateEmbed,
    CreateEmbedFooter, CreateInteractionResponse, CreateInteractionResponseMessage,
    CreateMessage, GetMessages, MessageId, UserId,
};
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_REASON: &str = "No reason provided";
const PURGE_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);
/// Discord refuses bulk deletion of messages older than two weeks.
const BULK_DELETE_MAX_AGE_SECS: i64 = 14 * 24 * 60 * 60;
const BULK_DELETE_MAX: usize = 100;

/// Where a member sits in the server: their id and highest role position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    pub user_id: UserId,
    pub top_role: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    #[error("❌ You cannot punish yourself.")]
    SelfTarget,
    #[error("❌ I cannot punish myself.")]
    BotTarget,
    #[error("👑 You cannot punish the Server Owner.")]
    ServerOwner,
    #[error("🛡️ **Hierarchy Error:** This user has a role equal to or higher than yours.")]
    OutranksActor,
    #[error("🤖 **Bot Hierarchy Error:** I cannot punish this user because their role is higher than mine.")]
    OutranksBot,
}

/// Decides whether `actor` may kick or ban `target`. The server owner skips
/// the role comparison against themselves but the bot's own rank still applies.
pub fn check_hierarchy(
    actor: Standing,
    target: Standing,
    bot: Standing,
    owner_id: UserId,
) -> Result<(), HierarchyError> {
    if target.user_id == actor.user_id {
        return Err(HierarchyError::SelfTarget);
    }
    if target.user_id == bot.user_id {
        return Err(HierarchyError::BotTarget);
    }
    if target.user_id == owner_id {
        return Err(HierarchyError::ServerOwner);
    }
    if actor.user_id != owner_id && target.top_role >= actor.top_role {
        return Err(HierarchyError::OutranksActor);
    }
    if target.top_role >= bot.top_role {
        return Err(HierarchyError::OutranksBot);
    }
    Ok(())
}

/// Accepts a raw id or a user mention.
pub fn parse_user_id(raw: &str) -> Option<UserId> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("<@")
        .and_then(|s| s.strip_suffix('>'))
        .map(|s| s.trim_start_matches('!'))
        .unwrap_or(trimmed);
    digits
        .parse::<u64>()
        .ok()
        .filter(|&id| id != 0)
        .map(UserId::new)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeScan {
    pub total: usize,
    pub with_links: usize,
    pub with_files: usize,
}

/// Counts messages by `(content, attachment count)`.
pub fn scan_messages<'a>(messages: impl IntoIterator<Item = (&'a str, usize)>) -> PurgeScan {
    messages
        .into_iter()
        .fold(PurgeScan::default(), |mut scan, (content, attachments)| {
            scan.total += 1;
            if content.contains("http") {
                scan.with_links += 1;
            }
            if attachments > 0 {
                scan.with_files += 1;
            }
            scan
        })
}

/// Splits `(id, created unix seconds)` pairs into bulk-deletable and old.
pub fn split_by_age(messages: &[(MessageId, i64)], now: i64) -> (Vec<MessageId>, Vec<MessageId>) {
    let (recent, old): (Vec<&(MessageId, i64)>, Vec<&(MessageId, i64)>) = messages
        .iter()
        .partition(|(_, created)| now - created < BULK_DELETE_MAX_AGE_SECS);
    (
        recent.into_iter().map(|(id, _)| *id).collect(),
        old.into_iter().map(|(id, _)| *id).collect(),
    )
}

#[derive(Debug, Clone, Copy)]
enum Punishment {
    Kick,
    Ban,
}

impl Punishment {
    fn past_tense(self) -> &'static str {
        match self {
            Punishment::Kick => "Kicked",
            Punishment::Ban => "Banned",
        }
    }

    fn result_title(self) -> &'static str {
        match self {
            Punishment::Kick => "👢 User has been kicked",
            Punishment::Ban => "🔨 User has been banned",
        }
    }

    fn color(self) -> u32 {
        match self {
            Punishment::Kick => 0xE67E22,
            Punishment::Ban => 0xE74C3C,
        }
    }

    fn permission(self) -> &'static str {
        match self {
            Punishment::Kick => "Kick Members",
            Punishment::Ban => "Ban Members",
        }
    }
}

async fn reply_ephemeral(ctx: Context<'_>, text: impl Into<String>) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}

/// Kick a member from the server
#[poise::command(slash_command, required_permissions = "KICK_MEMBERS", guild_only)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] member: serenity::Member,
    #[description = "Reason shown to the member and in the audit log"]
    #[max_length = 512]
    reason: Option<String>,
) -> Result<(), Error> {
    punish(ctx, member, reason, Punishment::Kick).await
}

/// Ban a member from the server
#[poise::command(slash_command, required_permissions = "BAN_MEMBERS", guild_only)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "Member to ban"] member: serenity::Member,
    #[description = "Reason shown to the member and in the audit log"]
    #[max_length = 512]
    reason: Option<String>,
) -> Result<(), Error> {
    punish(ctx, member, reason, Punishment::Ban).await
}

async fn punish(
    ctx: Context<'_>,
    member: serenity::Member,
    reason: Option<String>,
    action: Punishment,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command only works in a server")?;
    let reason = reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REASON.to_string());

    let author = ctx
        .author_member()
        .await
        .ok_or("Could not resolve your server membership")?
        .into_owned();
    let bot = guild_id.member(ctx, ctx.data().bot_id).await?;

    let (owner_id, guild_name, actor, target, bot) = {
        let guild = ctx.guild().ok_or("Server is not cached yet")?;
        let standing = |m: &serenity::Member| Standing {
            user_id: m.user.id,
            top_role: guild.member_highest_role(m).map_or(0, |r| r.position),
        };
        (
            guild.owner_id,
            guild.name.clone(),
            standing(&author),
            standing(&member),
            standing(&bot),
        )
    };

    if let Err(e) = check_hierarchy(actor, target, bot, owner_id) {
        return reply_ephemeral(ctx, e.to_string()).await;
    }

    ctx.defer_ephemeral().await?;

    // Members can only be messaged while they still share the server.
    let notice = CreateEmbed::new()
        .title(format!("You were {} from {}", action.past_tense(), guild_name))
        .color(0xE74C3C)
        .field("Reason", &reason, false)
        .field("Moderator", ctx.author().name.clone(), false);
    let dm_status = match member
        .user
        .direct_message(ctx, CreateMessage::new().embed(notice))
        .await
    {
        Ok(_) => "✅ DM Sent",
        Err(e) => {
            warn!("Could not DM {} before moderation: {}", member.user.id, e);
            "❌ DM Failed (User has DMs off)"
        }
    };

    let result = match action {
        Punishment::Kick => {
            guild_id
                .kick_with_reason(ctx.http(), member.user.id, &reason)
                .await
        }
        Punishment::Ban => {
            guild_id
                .ban_with_reason(ctx.http(), member.user.id, 0, &reason)
                .await
        }
    };
    if let Err(e) = result {
        return match SinkError::from(e) {
            SinkError::PermissionDenied => {
                reply_ephemeral(
                    ctx,
                    format!(
                        "❌ **Error:** I do not have the `{}` permission.",
                        action.permission()
                    ),
                )
                .await
            }
            other => Err(other.into()),
        };
    }

    info!(
        "{} {} from guild {} by {}: {}",
        action.past_tense(),
        member.user.id,
        guild_id,
        ctx.author().id,
        reason
    );

    let embed = CreateEmbed::new()
        .title(action.result_title())
        .color(action.color())
        .field("User", format!("{} (`{}`)", member.user.name, member.user.id), true)
        .field("Reason", &reason, true)
        .footer(CreateEmbedFooter::new(format!(
            "{} • Action by {}",
            dm_status,
            ctx.author().name
        )))
        .timestamp(serenity::Timestamp::now());
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Lift a ban by user ID
#[poise::command(slash_command, required_permissions = "BAN_MEMBERS", guild_only)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "ID (or mention) of the banned user"] user_id: String,
    #[description = "Reason for the audit log"]
    #[max_length = 512]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command only works in a server")?;
    let Some(user_id) = parse_user_id(&user_id) else {
        return reply_ephemeral(ctx, "❌ Invalid User ID provided.").await;
    };
    let reason = reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REASON.to_string());

    if let Err(e) = guild_id.unban(ctx.http(), user_id).await {
        return match SinkError::from(e) {
            SinkError::NotFound => reply_ephemeral(ctx, "❌ User not found in ban list.").await,
            SinkError::PermissionDenied => {
                reply_ephemeral(ctx, "❌ **Error:** I do not have the `Ban Members` permission.")
                    .await
            }
            other => Err(other.into()),
        };
    }

    info!(
        "Unbanned {} in guild {} by {}: {}",
        user_id,
        guild_id,
        ctx.author().id,
        reason
    );

    let embed = CreateEmbed::new()
        .title("🔓 User has been unbanned")
        .color(0x2ECC71)
        .field("User", format!("<@{}> (`{}`)", user_id, user_id), true)
        .field("Reason", &reason, true)
        .footer(CreateEmbedFooter::new(format!(
            "Action by {}",
            ctx.author().name
        )))
        .timestamp(serenity::Timestamp::now());
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Delete recent messages in this channel after a confirmation (Admin only)
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    required_bot_permissions = "MANAGE_MESSAGES",
    guild_only
)]
pub async fn purge(
    ctx: Context<'_>,
    #[description = "How many recent messages to delete"]
    #[min = 1]
    #[max = 100]
    amount: u8,
) -> Result<(), Error> {
    if amount == 0 {
        return reply_ephemeral(ctx, "❌ Please enter a number greater than 0.").await;
    }
    ctx.defer_ephemeral().await?;

    let channel_id = ctx.channel_id();
    let messages = channel_id
        .messages(ctx, GetMessages::new().limit(amount))
        .await?;
    let scan = scan_messages(
        messages
            .iter()
            .map(|m| (m.content.as_str(), m.attachments.len())),
    );
    let targets: Vec<(MessageId, i64)> = messages
        .iter()
        .map(|m| (m.id, m.timestamp.unix_timestamp()))
        .collect();

    let confirm_id = format!("{}-purge-confirm", ctx.id());
    let cancel_id = format!("{}-purge-cancel", ctx.id());
    let embed = CreateEmbed::new()
        .title("⚠️ Confirm Purge")
        .description(format!(
            "You are about to delete **{}** messages in <#{}>.",
            scan.total, channel_id
        ))
        .color(0xE67E22)
        .field("Total Messages", scan.total.to_string(), true)
        .field("Contains Links", scan.with_links.to_string(), true)
        .field("Contains Images/Files", scan.with_files.to_string(), true)
        .footer(CreateEmbedFooter::new("Administrator Permission Verified"));
    let buttons = CreateActionRow::Buttons(vec![
        CreateButton::new(confirm_id.clone())
            .label("🗑️ Confirm Purge")
            .style(ButtonStyle::Danger),
        CreateButton::new(cancel_id.clone())
            .label("Cancel")
            .style(ButtonStyle::Secondary),
    ]);
    let handle = ctx
        .send(
            poise::CreateReply::default()
                .embed(embed)
                .components(vec![buttons])
                .ephemeral(true),
        )
        .await?;

    let filter_ids = (confirm_id.clone(), cancel_id);
    let Some(press) = ComponentInteractionCollector::new(ctx)
        .author_id(ctx.author().id)
        .channel_id(channel_id)
        .timeout(PURGE_CONFIRM_TIMEOUT)
        .filter(move |i| i.data.custom_id == filter_ids.0 || i.data.custom_id == filter_ids.1)
        .await
    else {
        handle
            .edit(
                ctx,
                poise::CreateReply::default()
                    .content("⌛ Purge timed out.")
                    .components(vec![]),
            )
            .await?;
        return Ok(());
    };

    if press.data.custom_id != confirm_id {
        press
            .create_response(
                ctx,
                CreateInteractionResponse::UpdateMessage(
                    CreateInteractionResponseMessage::new()
                        .content("✅ **Purge Cancelled.**")
                        .embeds(vec![])
                        .components(vec![]),
                ),
            )
            .await?;
        return Ok(());
    }

    press
        .create_response(
            ctx,
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .content("**🗑️ Purging...**")
                    .embeds(vec![])
                    .components(vec![]),
            ),
        )
        .await?;

    let (recent, old) = split_by_age(&targets, chrono::Utc::now().timestamp());
    let mut deleted = 0;
    for chunk in recent.chunks(BULK_DELETE_MAX) {
        if let [single] = chunk {
            channel_id.delete_message(ctx.http(), *single).await?;
        } else {
            channel_id.delete_messages(ctx.http(), chunk).await?;
        }
        deleted += chunk.len();
    }
    for id in old {
        match channel_id.delete_message(ctx.http(), id).await {
            Ok(()) => deleted += 1,
            Err(e) => warn!("Could not delete old message {} in {}: {}", id, channel_id, e),
        }
    }

    info!(
        "Purged {} messages in {} by {}",
        deleted,
        channel_id,
        ctx.author().id
    );
    reply_ephemeral(ctx, format!("✅ **Purged {} messages.**", deleted)).await
}
