use crate::config::AI_CHUNK_SIZE;
use crate::llm::{self, split_message};
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

const THREAD_NAME_LIMIT: usize = 20;

/// The message mentions the bot or replies to one of its messages.
pub fn is_addressed_to_bot(message: &serenity::Message, bot_id: serenity::UserId) -> bool {
    message.mentions.iter().any(|u| u.id == bot_id)
        || message
            .referenced_message
            .as_deref()
            .is_some_and(|m| m.author.id == bot_id)
}

pub fn strip_bot_mentions(input: &str, bot_id: serenity::UserId) -> String {
    let mention = format!("<@{}>", bot_id);
    let mention_nick = format!("<@!{}>", bot_id);

    input
        .replace(&mention, "")
        .replace(&mention_nick, "")
        .trim()
        .to_string()
}

fn thread_name(display_name: &str) -> String {
    format!("AI Chat - {}", display_name)
        .chars()
        .take(THREAD_NAME_LIMIT)
        .collect()
}

/// Answer a premium user who pinged the bot. Public channels get a thread
/// per question; inside a thread the answer stays there.
pub async fn handle_mention(
    ctx: &serenity::Context,
    new_message: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    let Some(llm_client) = &data.llm else {
        return Ok(());
    };

    let query = strip_bot_mentions(&new_message.content, data.bot_id);
    if query.is_empty() {
        return Ok(());
    }
    if !data.premium.tier(new_message.author.id).await?.is_premium() {
        return Ok(());
    }

    info!(
        "Handling AI mention from {} in channel {}",
        new_message.author.name, new_message.channel_id
    );

    let target = reply_channel(ctx, new_message).await;
    let typing = target.start_typing(&ctx.http);
    let answer = llm::converse(
        llm_client,
        &data.sessions,
        &data.config.system_prompt,
        new_message.author.id,
        &query,
    )
    .await;
    drop(typing);

    for part in split_message(&answer, AI_CHUNK_SIZE) {
        target.say(&ctx.http, part).await?;
    }
    Ok(())
}

async fn reply_channel(ctx: &serenity::Context, message: &serenity::Message) -> serenity::ChannelId {
    if let Ok(serenity::Channel::Guild(channel)) = message.channel(ctx).await {
        if matches!(
            channel.kind,
            serenity::ChannelType::PublicThread
                | serenity::ChannelType::PrivateThread
                | serenity::ChannelType::NewsThread
        ) {
            return channel.id;
        }
    }

    let builder = serenity::CreateThread::new(thread_name(message.author.display_name()))
        .auto_archive_duration(serenity::AutoArchiveDuration::OneHour);
    match message
        .channel_id
        .create_thread_from_message(ctx, message.id, builder)
        .await
    {
        Ok(thread) => thread.id,
        Err(e) => {
            warn!("Thread creation failed in {}: {}", message.channel_id, e);
            message.channel_id
        }
    }
}
