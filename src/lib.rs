pub mod clock;
pub mod commands;
pub mod config;
pub mod events;
pub mod llm;
pub mod mention;
pub mod services;
pub mod sink;
pub mod sticky;
pub mod store;
pub mod throttle;
pub mod triggers;

use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub sticky: Arc<sticky::StickyManager>,
    pub triggers: Arc<triggers::TriggerEngine>,
    pub premium: services::premium::PremiumService,
    /// `None` when AI chat is disabled
    pub llm: Option<llm::LlmClient>,
    pub sessions: llm::ChatSessions,
    pub bot_id: serenity::all::UserId,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
