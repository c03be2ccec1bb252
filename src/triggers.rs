//! Keyword triggers: per-guild keyword → response rules checked against every
//! inbound message.
//!
//! At most one rule fires per message. Exact matches take precedence over
//! word matches regardless of rule order; within each pass the earliest
//! created rule wins. Two throttles apply: a per-channel window shared by all
//! rules and a per-(channel, keyword) cooldown.

use crate::clock::Clock;
use crate::services::premium::{PremiumService, Tier, TriggerLimits};
use crate::sink::{MessageSink, OutboundMessage};
use crate::store::{self, Filter, KeyValueStore, StoreError, SMART_TRIGGERS};
use crate::throttle::CooldownMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, GuildId, MessageId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MAX_KEYWORD_CHARS: usize = 50;
pub const MAX_RESPONSE_CHARS: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// The whole message must equal the keyword.
    Strict,
    /// The keyword must appear as a standalone word or phrase.
    Smart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRule {
    pub guild_id: GuildId,
    pub keyword: String,
    pub response: String,
    pub match_mode: MatchMode,
    pub owner_id: UserId,
    pub created_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("trigger quota reached ({count}/{limit})")]
    QuotaExceeded { count: usize, limit: usize, tier: Tier },
    #[error("a trigger for `{0}` already exists in this server")]
    DuplicateRule(String),
    #[error("invalid trigger: {0}")]
    InvalidRule(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    NoRules,
    Throttled,
    NoMatch,
    CoolingDown { keyword: String },
    Fired { keyword: String, message_id: MessageId },
    SendFailed { keyword: String },
}

#[derive(Debug, Clone, Copy)]
pub struct TriggerSettings {
    pub channel_throttle: Duration,
    pub keyword_cooldown: Duration,
    pub limits: TriggerLimits,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            channel_throttle: Duration::from_secs(3),
            keyword_cooldown: Duration::from_secs(5),
            limits: TriggerLimits::default(),
        }
    }
}

/// Lowercases and collapses whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `keyword` occurs in `text` delimited by spaces or the message bounds.
/// Both sides must already be normalized.
pub fn contains_word(text: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }
    format!(" {} ", text).contains(&format!(" {} ", keyword))
}

/// Picks the rule that answers `text`, if any.
pub fn select_rule<'a>(rules: &'a [TriggerRule], text: &str) -> Option<&'a TriggerRule> {
    rules.iter().find(|r| r.keyword == text).or_else(|| {
        rules
            .iter()
            .find(|r| r.match_mode == MatchMode::Smart && contains_word(text, &r.keyword))
    })
}

fn rule_key(guild_id: GuildId, keyword: &str) -> String {
    format!("{}:{}", guild_id, keyword)
}

fn owner_filter(owner_id: UserId) -> Result<Filter, StoreError> {
    let value = serde_json::to_value(owner_id).map_err(|e| StoreError::Corrupt {
        collection: SMART_TRIGGERS.to_string(),
        key: owner_id.to_string(),
        reason: e.to_string(),
    })?;
    Ok(Filter::eq("owner_id", value))
}

pub struct TriggerEngine {
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
    premium: PremiumService,
    limits: TriggerLimits,
    rules: RwLock<HashMap<GuildId, Vec<TriggerRule>>>,
    channel_throttle: CooldownMap<ChannelId>,
    keyword_cooldowns: CooldownMap<(ChannelId, String)>,
    /// Serializes rule writes so the quota check and the insert act as one step.
    write_lock: tokio::sync::Mutex<()>,
}

impl TriggerEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
        premium: PremiumService,
        settings: TriggerSettings,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            premium,
            limits: settings.limits,
            rules: RwLock::new(HashMap::new()),
            channel_throttle: CooldownMap::new(settings.channel_throttle),
            keyword_cooldowns: CooldownMap::new(settings.keyword_cooldown),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Builds the engine and fills its cache from the store.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
        premium: PremiumService,
        settings: TriggerSettings,
    ) -> Result<Self, StoreError> {
        let engine = Self::new(store, sink, clock, premium, settings);
        let docs = engine.store.list(SMART_TRIGGERS, &Filter::all()).await?;

        let mut by_guild: HashMap<GuildId, Vec<TriggerRule>> = HashMap::new();
        let mut loaded = 0;
        for doc in docs {
            let key = doc
                .get("keyword")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string());
            match store::decode::<TriggerRule>(SMART_TRIGGERS, &key, doc) {
                Ok(rule) => {
                    by_guild.entry(rule.guild_id).or_default().push(rule);
                    loaded += 1;
                }
                Err(e) => warn!("Skipping unreadable trigger: {}", e),
            }
        }
        for rules in by_guild.values_mut() {
            rules.sort_by_key(|r| r.created_at);
        }

        *engine.rules.write().unwrap_or_else(|e| e.into_inner()) = by_guild;
        info!("Loaded {} smart triggers", loaded);
        Ok(engine)
    }

    pub fn rules(&self, guild_id: GuildId) -> Vec<TriggerRule> {
        let rules = self.rules.read().unwrap_or_else(|e| e.into_inner());
        rules.get(&guild_id).cloned().unwrap_or_default()
    }

    pub fn rule_count(&self, guild_id: GuildId) -> usize {
        let rules = self.rules.read().unwrap_or_else(|e| e.into_inner());
        rules.get(&guild_id).map_or(0, Vec::len)
    }

    /// Rules created by `owner_id` across every guild.
    pub async fn owner_rule_count(&self, owner_id: UserId) -> Result<usize, StoreError> {
        let filter = owner_filter(owner_id)?;
        Ok(self.store.list(SMART_TRIGGERS, &filter).await?.len())
    }

    /// Quota usage for `owner_id` as `(used, limit)`.
    pub async fn quota(&self, owner_id: UserId) -> Result<(usize, usize), StoreError> {
        let used = self.owner_rule_count(owner_id).await?;
        let tier = self.premium.tier(owner_id).await?;
        Ok((used, tier.trigger_limit(&self.limits)))
    }

    pub async fn add_rule(
        &self,
        guild_id: GuildId,
        owner_id: UserId,
        keyword: &str,
        response: &str,
        match_mode: MatchMode,
    ) -> Result<TriggerRule, TriggerError> {
        let keyword = normalize(keyword);
        if keyword.is_empty() {
            return Err(TriggerError::InvalidRule("keyword cannot be empty".to_string()));
        }
        if keyword.chars().count() > MAX_KEYWORD_CHARS {
            return Err(TriggerError::InvalidRule(format!(
                "keyword is longer than {} characters",
                MAX_KEYWORD_CHARS
            )));
        }
        // The response is stored as entered; only a blank one is refused.
        if response.trim().is_empty() {
            return Err(TriggerError::InvalidRule("response cannot be empty".to_string()));
        }
        if response.chars().count() > MAX_RESPONSE_CHARS {
            return Err(TriggerError::InvalidRule(format!(
                "response is longer than {} characters",
                MAX_RESPONSE_CHARS
            )));
        }

        let _guard = self.write_lock.lock().await;
        let count = self.owner_rule_count(owner_id).await?;
        let tier = self.premium.tier(owner_id).await?;
        let limit = tier.trigger_limit(&self.limits);
        if count >= limit {
            return Err(TriggerError::QuotaExceeded { count, limit, tier });
        }

        let key = rule_key(guild_id, &keyword);
        if self.store.get(SMART_TRIGGERS, &key).await?.is_some() {
            return Err(TriggerError::DuplicateRule(keyword));
        }

        let rule = TriggerRule {
            guild_id,
            keyword,
            response: response.to_string(),
            match_mode,
            owner_id,
            created_at: Utc::now().timestamp(),
        };
        let fields = store::encode(SMART_TRIGGERS, &key, &rule)?;
        self.store.upsert(SMART_TRIGGERS, &key, fields).await?;

        {
            let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
            let list = rules.entry(guild_id).or_default();
            list.retain(|r| r.keyword != rule.keyword);
            list.push(rule.clone());
        }

        info!(
            "Trigger `{}` ({:?}) added in guild {} by {}",
            rule.keyword, rule.match_mode, guild_id, owner_id
        );
        Ok(rule)
    }

    /// Returns the number of stored rules removed; zero when none matched.
    pub async fn remove_rule(&self, guild_id: GuildId, keyword: &str) -> Result<usize, TriggerError> {
        let keyword = normalize(keyword);
        let _guard = self.write_lock.lock().await;
        let deleted = self
            .store
            .delete(SMART_TRIGGERS, &rule_key(guild_id, &keyword))
            .await?;

        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = rules.get_mut(&guild_id) {
            list.retain(|r| r.keyword != keyword);
            if list.is_empty() {
                rules.remove(&guild_id);
            }
        }

        if deleted > 0 {
            info!("Trigger `{}` removed from guild {}", keyword, guild_id);
        }
        Ok(deleted)
    }

    /// Checks one inbound message and sends at most one response.
    pub async fn evaluate(&self, guild_id: GuildId, channel_id: ChannelId, text: &str) -> Evaluation {
        let now = self.clock.now();
        let rule = {
            let rules = self.rules.read().unwrap_or_else(|e| e.into_inner());
            let Some(list) = rules.get(&guild_id).filter(|l| !l.is_empty()) else {
                return Evaluation::NoRules;
            };
            if self.channel_throttle.is_cooling(&channel_id, now) {
                return Evaluation::Throttled;
            }
            match select_rule(list, &normalize(text)) {
                Some(rule) => rule.clone(),
                None => return Evaluation::NoMatch,
            }
        };

        let cooldown_key = (channel_id, rule.keyword.clone());
        if self.keyword_cooldowns.is_cooling(&cooldown_key, now) {
            debug!("Trigger `{}` cooling down in {}", rule.keyword, channel_id);
            return Evaluation::CoolingDown {
                keyword: rule.keyword,
            };
        }

        match self
            .sink
            .send(channel_id, OutboundMessage::text(rule.response.clone()))
            .await
        {
            Ok(message_id) => {
                self.keyword_cooldowns.mark(cooldown_key, now);
                self.channel_throttle.mark(channel_id, now);
                debug!("Trigger `{}` fired in {}", rule.keyword, channel_id);
                Evaluation::Fired {
                    keyword: rule.keyword,
                    message_id,
                }
            }
            Err(e) => {
                warn!(
                    "Failed to send trigger `{}` response in {}: {}",
                    rule.keyword, channel_id, e
                );
                Evaluation::SendFailed {
                    keyword: rule.keyword,
                }
            }
        }
    }
}
