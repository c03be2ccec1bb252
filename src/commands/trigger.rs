use crate::triggers::{MatchMode, TriggerError, MAX_KEYWORD_CHARS, MAX_RESPONSE_CHARS};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

const LIST_PREVIEW: usize = 15;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum Mode {
    #[name = "Smart (keyword anywhere as a word)"]
    Smart,
    #[name = "Strict (whole message must match)"]
    Strict,
}

impl From<Mode> for MatchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Smart => MatchMode::Smart,
            Mode::Strict => MatchMode::Strict,
        }
    }
}

/// Automatic replies to keywords
#[poise::command(
    slash_command,
    subcommands("add", "remove", "list"),
    required_permissions = "MANAGE_MESSAGES",
    guild_only
)]
pub async fn trigger(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a keyword trigger
#[poise::command(slash_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Keyword to listen for"]
    #[max_length = 50]
    keyword: String,
    #[description = "What the bot replies with"]
    #[max_length = 1500]
    response: String,
    #[description = "How the keyword is matched"] mode: Option<Mode>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let mode: MatchMode = mode.unwrap_or(Mode::Smart).into();

    let result = ctx
        .data()
        .triggers
        .add_rule(guild_id, ctx.author().id, &keyword, &response, mode)
        .await;

    let reply = match result {
        Ok(rule) => {
            let icon = match rule.match_mode {
                MatchMode::Strict => "🎯",
                MatchMode::Smart => "🧠",
            };
            poise::CreateReply::default().content(format!(
                "✅ {} Trigger **`{}`** ({:?}) added.",
                icon, rule.keyword, rule.match_mode
            ))
        }
        Err(TriggerError::QuotaExceeded { count, limit, tier }) => {
            let upsell = if tier.is_premium() {
                "You have reached the premium limit."
            } else {
                "👑 **Upgrade to Premium** for more triggers!"
            };
            let embed = serenity::CreateEmbed::new()
                .title("⛔ Limit Reached")
                .description(format!(
                    "You have used **{}/{}** triggers.\n\n{}",
                    count, limit, upsell
                ))
                .color(0xE74C3C);
            poise::CreateReply::default().embed(embed)
        }
        Err(TriggerError::DuplicateRule(keyword)) => poise::CreateReply::default().content(
            format!("❌ A trigger for `{}` already exists in this server.", keyword),
        ),
        Err(TriggerError::InvalidRule(reason)) => poise::CreateReply::default().content(format!(
            "❌ {} (keywords up to {} characters, responses up to {}).",
            reason, MAX_KEYWORD_CHARS, MAX_RESPONSE_CHARS
        )),
        Err(TriggerError::Store(e)) => return Err(e.into()),
    };

    ctx.send(reply.ephemeral(true)).await?;
    Ok(())
}

async fn autocomplete_keyword<'a>(
    ctx: Context<'a>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    let rules = ctx
        .guild_id()
        .map(|guild_id| ctx.data().triggers.rules(guild_id))
        .unwrap_or_default();
    let partial = partial.to_lowercase();
    rules
        .into_iter()
        .map(|rule| rule.keyword)
        .filter(move |keyword| keyword.starts_with(&partial))
        .take(25)
}

/// Remove a keyword trigger
#[poise::command(slash_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Keyword of the trigger to delete"]
    #[autocomplete = "autocomplete_keyword"]
    keyword: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    let reply = if ctx.data().triggers.remove_rule(guild_id, &keyword).await? > 0 {
        format!("🗑️ Trigger **`{}`** deleted.", keyword.trim().to_lowercase())
    } else {
        format!("📭 No trigger named `{}` in this server.", keyword.trim())
    };

    ctx.send(poise::CreateReply::default().content(reply).ephemeral(true))
        .await?;
    Ok(())
}

/// List this server's triggers and your quota
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let rules = ctx.data().triggers.rules(guild_id);
    let (used, limit) = ctx.data().triggers.quota(ctx.author().id).await?;

    let mut description = String::new();
    if rules.is_empty() {
        description.push_str("*No triggers set yet.*\n");
    }
    for rule in rules.iter().take(LIST_PREVIEW) {
        let (icon, kind) = match rule.match_mode {
            MatchMode::Strict => ("🎯", "Strict"),
            MatchMode::Smart => ("🧠", "Smart"),
        };
        let preview: String = rule.response.chars().take(50).collect();
        description.push_str(&format!(
            "• {} **`{}`** ({}) → {}\n",
            icon, rule.keyword, kind, preview
        ));
    }
    if rules.len() > LIST_PREVIEW {
        description.push_str(&format!(
            "\n**...and {} more triggers.**",
            rules.len() - LIST_PREVIEW
        ));
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!("📋 Trigger List ({})", rules.len()))
        .description(description)
        .field("Your quota", format!("`{}/{}`", used, limit), true)
        .color(0x3498DB);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}
