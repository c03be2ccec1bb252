use crate::services::premium::TriggerLimits;
use crate::triggers::TriggerSettings;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub owner_id: Option<u64>,
    pub database_url: String,
    pub status_message: String,
    pub dev_guild_id: Option<u64>,

    // AI chat; disabled when no endpoint is configured
    pub llm_url: Option<String>,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout_secs: u64,
    pub ai_session_ttl: Duration,
    pub ai_history_turns: usize,
    pub system_prompt: String,

    // Sticky and trigger throttles
    pub sticky_cooldown: Duration,
    pub trigger_channel_throttle: Duration,
    pub trigger_keyword_cooldown: Duration,
    pub standard_trigger_limit: usize,
    pub premium_trigger_limit: usize,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are GuM It, a friendly assistant living in a Discord server. \
Keep answers short, clear and formatted for Discord.";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/gumit.db".to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "📌 Keeping things sticky".to_string()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),

            llm_url: env::var("LLM_URL").ok().filter(|url| !url.trim().is_empty()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "local-model".to_string()),
            llm_api_key: env::var("LLM_API_KEY").ok(),
            llm_timeout_secs: env::var("LLM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
            ai_session_ttl: duration_var("AI_SESSION_TTL", Duration::from_secs(7200))?,
            ai_history_turns: env::var("AI_HISTORY_TURNS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            system_prompt: env::var("SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),

            sticky_cooldown: duration_var("STICKY_COOLDOWN", Duration::from_secs(6))?,
            trigger_channel_throttle: duration_var(
                "TRIGGER_CHANNEL_THROTTLE",
                Duration::from_secs(3),
            )?,
            trigger_keyword_cooldown: duration_var(
                "TRIGGER_KEYWORD_COOLDOWN",
                Duration::from_secs(5),
            )?,
            standard_trigger_limit: env::var("STANDARD_TRIGGER_LIMIT")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            premium_trigger_limit: env::var("PREMIUM_TRIGGER_LIMIT")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
        })
    }

    pub fn trigger_settings(&self) -> TriggerSettings {
        TriggerSettings {
            channel_throttle: self.trigger_channel_throttle,
            keyword_cooldown: self.trigger_keyword_cooldown,
            limits: TriggerLimits {
                standard: self.standard_trigger_limit,
                premium: self.premium_trigger_limit,
            },
        }
    }
}

/// Reads a humantime duration such as `6s` or `2h`.
fn duration_var(name: &str, default: Duration) -> anyhow::Result<Duration> {
    match env::var(name) {
        Ok(raw) => humantime::parse_duration(raw.trim())
            .map_err(|e| anyhow::anyhow!("{} must be a duration like `6s`: {}", name, e)),
        Err(_) => Ok(default),
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("database_url", &self.database_url)
            .field("status_message", &self.status_message)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("llm_url", &self.llm_url)
            .field("llm_model", &self.llm_model)
            .field(
                "llm_api_key",
                &self.llm_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field(
                "ai_session_ttl",
                &humantime::format_duration(self.ai_session_ttl).to_string(),
            )
            .field("ai_history_turns", &self.ai_history_turns)
            .field("system_prompt", &self.system_prompt)
            .field(
                "sticky_cooldown",
                &humantime::format_duration(self.sticky_cooldown).to_string(),
            )
            .field(
                "trigger_channel_throttle",
                &humantime::format_duration(self.trigger_channel_throttle).to_string(),
            )
            .field(
                "trigger_keyword_cooldown",
                &humantime::format_duration(self.trigger_keyword_cooldown).to_string(),
            )
            .field("standard_trigger_limit", &self.standard_trigger_limit)
            .field("premium_trigger_limit", &self.premium_trigger_limit)
            .finish()
    }
}

/// Part size for long AI answers; Discord caps messages at 2000 characters
pub const AI_CHUNK_SIZE: usize = 1900;
