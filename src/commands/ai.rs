use crate::config::AI_CHUNK_SIZE;
use crate::llm::{self, split_message};
use crate::{Context, Error};

/// Chat privately with Gumit AI (Premium)
#[poise::command(slash_command, user_cooldown = 4)]
pub async fn ai_chat(
    ctx: Context<'_>,
    #[description = "Your question"] query: String,
) -> Result<(), Error> {
    let Some(llm_client) = &ctx.data().llm else {
        ctx.send(
            poise::CreateReply::default()
                .content("❌ AI chat is not configured on this bot.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    };

    if !ctx.data().premium.tier(ctx.author().id).await?.is_premium() {
        ctx.send(
            poise::CreateReply::default()
                .content("👑 AI chat is a Premium feature.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    ctx.defer_ephemeral().await?;

    let answer = llm::converse(
        llm_client,
        &ctx.data().sessions,
        &ctx.data().config.system_prompt,
        ctx.author().id,
        &query,
    )
    .await;

    for part in split_message(&answer, AI_CHUNK_SIZE) {
        ctx.send(poise::CreateReply::default().content(part).ephemeral(true))
            .await?;
    }
    Ok(())
}

/// Clear your AI chat history
#[poise::command(slash_command)]
pub async fn reset_ai(ctx: Context<'_>) -> Result<(), Error> {
    let reply = if ctx.data().sessions.reset(ctx.author().id) {
        "🧠 **Memory cleared.**"
    } else {
        "❌ No active session."
    };
    ctx.send(poise::CreateReply::default().content(reply).ephemeral(true))
        .await?;
    Ok(())
}
