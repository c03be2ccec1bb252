use crate::sticky::{RepostOutcome, StickyContent, StickyError};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Keep a message pinned to the bottom of a channel
#[poise::command(
    slash_command,
    subcommands("text", "embed", "list"),
    required_permissions = "MANAGE_MESSAGES",
    guild_only
)]
pub async fn stick(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Sticky a plain text message
#[poise::command(slash_command)]
pub async fn text(
    ctx: Context<'_>,
    #[description = "Message to keep at the bottom"]
    #[max_length = 1900]
    content: String,
    #[description = "Channel (defaults to this one)"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());
    configure(ctx, channel_id, StickyContent::PlainText { body: content }).await
}

/// Sticky an embed
#[poise::command(slash_command)]
pub async fn embed(
    ctx: Context<'_>,
    #[description = "Embed body"]
    #[max_length = 4000]
    description: String,
    #[description = "Embed title"]
    #[max_length = 256]
    title: Option<String>,
    #[description = "Hex colour like #1ABC9C, or a name such as gold"]
    color: Option<String>,
    #[description = "Large image URL"] image_url: Option<String>,
    #[description = "Thumbnail URL"] thumbnail_url: Option<String>,
    #[description = "Channel (defaults to this one)"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());
    let content = StickyContent::RichEmbed {
        title,
        description,
        color,
        image_url,
        thumbnail_url,
    };
    configure(ctx, channel_id, content).await
}

async fn configure(
    ctx: Context<'_>,
    channel_id: serenity::ChannelId,
    content: StickyContent,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;

    let reply = match ctx.data().sticky.configure(channel_id, content).await {
        Ok(RepostOutcome::Posted(_)) => format!("✅ Sticky message updated in <#{}>!", channel_id),
        Ok(RepostOutcome::Deactivated) => format!(
            "⚠️ I can't post in <#{}>, so the sticky was not kept. Check my permissions.",
            channel_id
        ),
        Ok(_) => format!(
            "✅ Sticky saved for <#{}>. It will appear after the next message.",
            channel_id
        ),
        Err(StickyError::EmptyContent) => "❌ The sticky message cannot be empty.".to_string(),
        Err(StickyError::Store(e)) => return Err(e.into()),
    };

    ctx.say(reply).await?;
    Ok(())
}

/// List the stickies configured in this server
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let channels = guild_id.channels(ctx.http()).await?;

    let stickies: Vec<_> = ctx
        .data()
        .sticky
        .list()
        .into_iter()
        .filter(|record| channels.contains_key(&record.channel_id))
        .collect();

    if stickies.is_empty() {
        ctx.send(
            poise::CreateReply::default()
                .content("📭 No sticky messages in this server.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let mut description = String::new();
    for record in &stickies {
        let preview = match &record.content {
            StickyContent::PlainText { body } => body.clone(),
            StickyContent::RichEmbed {
                title,
                description: body,
                ..
            } => title.clone().unwrap_or_else(|| body.clone()),
        };
        let kind = match record.content {
            StickyContent::PlainText { .. } => "Text",
            StickyContent::RichEmbed { .. } => "Embed",
        };
        let preview: String = preview.chars().take(50).collect();
        description.push_str(&format!(
            "• <#{}> ({}) → {}\n",
            record.channel_id, kind, preview
        ));
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!("📌 Sticky Messages ({})", stickies.len()))
        .description(description)
        .color(crate::sticky::DEFAULT_COLOR);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Stop the sticky message in a channel
#[poise::command(slash_command, required_permissions = "MANAGE_MESSAGES", guild_only)]
pub async fn unstick(
    ctx: Context<'_>,
    #[description = "Channel (defaults to this one)"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());

    let reply = if ctx.data().sticky.remove(channel_id).await? {
        format!("🗑️ Sticky message removed from <#{}>.", channel_id)
    } else {
        format!("📭 There is no sticky message in <#{}>.", channel_id)
    };

    ctx.send(poise::CreateReply::default().content(reply).ephemeral(true))
        .await?;
    Ok(())
}
