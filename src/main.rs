use gumit::clock::{Clock, SystemClock};
use gumit::llm::{ChatSessions, LlmClient};
use gumit::services::premium::PremiumService;
use gumit::sink::{MessageSink, SerenitySink};
use gumit::sticky::StickyManager;
use gumit::store::{KeyValueStore, SqliteStore};
use gumit::triggers::TriggerEngine;
use gumit::{commands, config::Config, events, Data};
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SESSION_CAPACITY: usize = 1000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);
    let discord_token = config.discord_token.clone();

    let store = SqliteStore::open(&config.database_url)?;
    store.execute_init()?;
    let store: Arc<dyn KeyValueStore> = Arc::new(store);

    let mut owners = HashSet::new();
    if let Some(owner_id) = config.owner_id {
        owners.insert(serenity::UserId::new(owner_id));
    }

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            owners,
            event_handler: |ctx, event, framework, data| {
                Box::pin(events::event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(events::on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot is ready as {}!", ready.user.name);

                match config.dev_guild_id {
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            serenity::GuildId::new(guild_id),
                        )
                        .await?;
                        info!("Registered commands in dev guild {}", guild_id);
                    }
                    None => {
                        poise::builtins::register_globally(ctx, &framework.options().commands)
                            .await?;
                    }
                }

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let clock: Arc<dyn Clock> = Arc::new(SystemClock);
                let sink: Arc<dyn MessageSink> = Arc::new(SerenitySink::new(ctx.http.clone()));
                let premium = PremiumService::new(
                    store.clone(),
                    config.owner_id.map(serenity::UserId::new),
                );

                let sticky = StickyManager::load(
                    store.clone(),
                    sink.clone(),
                    clock.clone(),
                    config.sticky_cooldown,
                )
                .await?;
                let triggers = TriggerEngine::load(
                    store.clone(),
                    sink,
                    clock.clone(),
                    premium.clone(),
                    config.trigger_settings(),
                )
                .await?;

                let llm = LlmClient::from_config(&config)?;
                if llm.is_none() {
                    info!("LLM_URL not set, AI chat disabled");
                }
                let sessions = ChatSessions::new(
                    clock,
                    config.ai_session_ttl,
                    config.ai_history_turns,
                    SESSION_CAPACITY,
                );

                Ok(Data {
                    config,
                    sticky: Arc::new(sticky),
                    triggers: Arc::new(triggers),
                    premium,
                    llm,
                    sessions,
                    bot_id: ready.user.id,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
