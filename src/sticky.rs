//! Sticky messages: one message per channel kept at the bottom of the chat
//! by deleting and reposting it after new activity.

use crate::clock::Clock;
use crate::sink::{EmbedSpec, MessageSink, OutboundMessage, SinkError};
use crate::store::{self, Filter, KeyValueStore, StoreError, STICKY_MESSAGES};
use crate::throttle::{within_window, KeyedLocks};
use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, MessageId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const TEXT_HEADER: &str = "__**📌 GuM It Message:**__";
pub const EMBED_FOOTER: &str = "📌 Sticky Message";
pub const DEFAULT_COLOR: u32 = 0x1ABC9C;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StickyContent {
    #[serde(rename = "text")]
    PlainText {
        #[serde(rename = "content")]
        body: String,
    },
    #[serde(rename = "embed")]
    RichEmbed {
        #[serde(default)]
        title: Option<String>,
        description: String,
        #[serde(default)]
        color: Option<String>,
        #[serde(default, rename = "image")]
        image_url: Option<String>,
        #[serde(default, rename = "thumbnail")]
        thumbnail_url: Option<String>,
    },
}

impl StickyContent {
    fn is_empty(&self) -> bool {
        match self {
            StickyContent::PlainText { body } => body.trim().is_empty(),
            StickyContent::RichEmbed { description, .. } => description.trim().is_empty(),
        }
    }

    pub fn render(&self) -> OutboundMessage {
        match self {
            StickyContent::PlainText { body } => {
                OutboundMessage::text(format!("{}\n{}", TEXT_HEADER, body))
            }
            StickyContent::RichEmbed {
                title,
                description,
                color,
                image_url,
                thumbnail_url,
            } => OutboundMessage::embed(EmbedSpec {
                title: title.clone(),
                description: description.clone(),
                color: parse_color(color.as_deref()),
                image_url: image_url.clone(),
                thumbnail_url: thumbnail_url.clone(),
                footer: Some(EMBED_FOOTER.to_string()),
            }),
        }
    }
}

/// Accepts `#RRGGBB` or a handful of colour names; anything else is teal.
pub fn parse_color(input: Option<&str>) -> u32 {
    let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEFAULT_COLOR;
    };

    if let Some(hex) = raw.strip_prefix('#') {
        if let Ok(value) = u32::from_str_radix(hex, 16) {
            if value <= 0xFF_FF_FF {
                return value;
            }
        }
    }

    match raw.to_lowercase().as_str() {
        "red" => 0xE74C3C,
        "blue" => 0x3498DB,
        "green" => 0x2ECC71,
        "gold" => 0xF1C40F,
        "purple" => 0x9B59B6,
        "orange" => 0xE67E22,
        "black" => 0x000000,
        _ => DEFAULT_COLOR,
    }
}

/// Persisted shape of a sticky.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSticky {
    channel_id: ChannelId,
    #[serde(flatten)]
    content: StickyContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickyRecord {
    pub channel_id: ChannelId,
    pub content: StickyContent,
    pub last_message_id: Option<MessageId>,
    pub last_post_time: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepostOutcome {
    NotConfigured,
    CoolingDown,
    Posted(MessageId),
    /// The bot lost permission to post; the sticky was removed.
    Deactivated,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum StickyError {
    #[error("sticky content cannot be empty")]
    EmptyContent,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct StickyManager {
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    records: RwLock<HashMap<ChannelId, StickyRecord>>,
    locks: KeyedLocks<ChannelId>,
}

impl StickyManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            cooldown,
            records: RwLock::new(HashMap::new()),
            locks: KeyedLocks::new(),
        }
    }

    /// Builds the manager and fills its cache from the store.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
        cooldown: Duration,
    ) -> Result<Self, StoreError> {
        let manager = Self::new(store, sink, clock, cooldown);
        let docs = manager.store.list(STICKY_MESSAGES, &Filter::all()).await?;

        let mut loaded = 0;
        for doc in docs {
            let key = doc
                .get("channel_id")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string());
            match store::decode::<StoredSticky>(STICKY_MESSAGES, &key, doc) {
                Ok(stored) => {
                    manager.insert_cached(stored.channel_id, stored.content);
                    loaded += 1;
                }
                Err(e) => warn!("Skipping unreadable sticky: {}", e),
            }
        }

        info!("Loaded {} sticky messages", loaded);
        Ok(manager)
    }

    pub fn get(&self, channel_id: ChannelId) -> Option<StickyRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.get(&channel_id).cloned()
    }

    pub fn list(&self) -> Vec<StickyRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<_> = records.values().cloned().collect();
        list.sort_by_key(|r| r.channel_id);
        list
    }

    /// Saves the sticky and posts it straight away, ignoring the cooldown.
    pub async fn configure(
        &self,
        channel_id: ChannelId,
        content: StickyContent,
    ) -> Result<RepostOutcome, StickyError> {
        if content.is_empty() {
            return Err(StickyError::EmptyContent);
        }

        let key = channel_id.to_string();
        let stored = StoredSticky {
            channel_id,
            content: content.clone(),
        };
        let fields = store::encode(STICKY_MESSAGES, &key, &stored)?;
        self.store.upsert(STICKY_MESSAGES, &key, fields).await?;

        self.insert_cached(channel_id, content);
        info!("Sticky configured in channel {}", channel_id);

        Ok(self.repost(channel_id, true).await)
    }

    /// Stops the sticky. The last posted copy stays in the channel.
    pub async fn remove(&self, channel_id: ChannelId) -> Result<bool, StickyError> {
        let deleted = self
            .store
            .delete(STICKY_MESSAGES, &channel_id.to_string())
            .await?;

        let evicted = self.evict(channel_id);
        info!("Sticky removed from channel {}", channel_id);
        Ok(evicted || deleted > 0)
    }

    /// Called for every non-bot message seen in `channel_id`.
    pub async fn on_channel_activity(&self, channel_id: ChannelId) -> RepostOutcome {
        self.repost(channel_id, false).await
    }

    fn insert_cached(&self, channel_id: ChannelId, content: StickyContent) {
        {
            let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
            records
                .entry(channel_id)
                .and_modify(|r| r.content = content.clone())
                .or_insert_with(|| StickyRecord {
                    channel_id,
                    content,
                    last_message_id: None,
                    last_post_time: None,
                });
        }
        self.locks.ensure(&channel_id);
    }

    /// Drops the cached record. The channel lock outlives it so a repost still
    /// in flight keeps excluding any repost for a later configuration.
    fn evict(&self, channel_id: ChannelId) -> bool {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.remove(&channel_id).is_some()
    }

    fn is_cooling(&self, record: &StickyRecord) -> bool {
        record
            .last_post_time
            .is_some_and(|last| within_window(last, self.clock.now(), self.cooldown))
    }

    fn update_record(&self, channel_id: ChannelId, f: impl FnOnce(&mut StickyRecord)) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = records.get_mut(&channel_id) {
            f(record);
        }
    }

    async fn repost(&self, channel_id: ChannelId, force: bool) -> RepostOutcome {
        let Some(record) = self.get(channel_id) else {
            return RepostOutcome::NotConfigured;
        };
        if !force && self.is_cooling(&record) {
            return RepostOutcome::CoolingDown;
        }

        let Some(lock) = self.locks.get(&channel_id) else {
            return RepostOutcome::NotConfigured;
        };
        let _guard = lock.lock().await;

        // Whoever held the lock before us may have posted or removed the sticky.
        let Some(record) = self.get(channel_id) else {
            return RepostOutcome::NotConfigured;
        };
        if !force && self.is_cooling(&record) {
            return RepostOutcome::CoolingDown;
        }

        if let Some(old_id) = record.last_message_id {
            match self.sink.delete(channel_id, old_id).await {
                Ok(_) => self.update_record(channel_id, |r| r.last_message_id = None),
                Err(e) => debug!(
                    "Could not delete previous sticky {} in {}: {}",
                    old_id, channel_id, e
                ),
            }
        }

        match self.sink.send(channel_id, record.content.render()).await {
            Ok(message_id) => {
                let now = self.clock.now();
                self.update_record(channel_id, |r| {
                    r.last_message_id = Some(message_id);
                    r.last_post_time = Some(now);
                });
                debug!("Sticky reposted in {} as {}", channel_id, message_id);
                RepostOutcome::Posted(message_id)
            }
            Err(SinkError::PermissionDenied) => {
                warn!("Lost permissions in {}, disabling sticky", channel_id);
                self.evict(channel_id);
                if let Err(e) = self
                    .store
                    .delete(STICKY_MESSAGES, &channel_id.to_string())
                    .await
                {
                    error!("Failed to delete sticky row for {}: {}", channel_id, e);
                }
                RepostOutcome::Deactivated
            }
            Err(e) => {
                warn!("Failed to repost sticky in {}: {}", channel_id, e);
                RepostOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sink::testing::RecordingSink;
    use crate::store::{MemoryStore, SqliteStore};
    use serde_json::json;

    const COOLDOWN: Duration = Duration::from_secs(6);

    struct Harness {
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
        clock: Arc<ManualClock>,
        manager: StickyManager,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::new());
        let manager = StickyManager::new(store.clone(), sink.clone(), clock.clone(), COOLDOWN);
        Harness {
            store,
            sink,
            clock,
            manager,
        }
    }

    fn text(body: &str) -> StickyContent {
        StickyContent::PlainText {
            body: body.to_string(),
        }
    }

    fn channel() -> ChannelId {
        ChannelId::new(42)
    }

    #[tokio::test]
    async fn test_end_to_end_repost_cycle() {
        let h = harness();

        let RepostOutcome::Posted(m1) = h.manager.configure(channel(), text("Rules here")).await.unwrap()
        else {
            panic!("configure should post immediately");
        };
        assert_eq!(h.sink.live(channel()), vec![m1]);

        h.clock.advance(Duration::from_secs(7));
        let RepostOutcome::Posted(m2) = h.manager.on_channel_activity(channel()).await else {
            panic!("activity after cooldown should repost");
        };
        assert_ne!(m1, m2);
        assert_eq!(h.sink.deleted(), vec![m1]);
        assert_eq!(h.sink.live(channel()), vec![m2]);

        h.clock.advance(Duration::from_millis(500));
        assert_eq!(h.manager.on_channel_activity(channel()).await, RepostOutcome::CoolingDown);
        assert_eq!(h.sink.live(channel()), vec![m2]);
        assert_eq!(h.manager.get(channel()).unwrap().last_message_id, Some(m2));

        let (_, _, message) = &h.sink.sent()[1];
        assert_eq!(
            message.content.as_deref(),
            Some("__**📌 GuM It Message:**__\nRules here")
        );
    }

    #[tokio::test]
    async fn test_activity_within_cooldown_sends_once() {
        let h = harness();
        h.manager.configure(channel(), text("hi")).await.unwrap();
        h.clock.advance(Duration::from_secs(10));

        assert!(matches!(
            h.manager.on_channel_activity(channel()).await,
            RepostOutcome::Posted(_)
        ));
        h.clock.advance(Duration::from_secs(2));
        assert_eq!(h.manager.on_channel_activity(channel()).await, RepostOutcome::CoolingDown);

        assert_eq!(h.sink.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_unconfigured_channel_is_ignored() {
        let h = harness();
        assert_eq!(
            h.manager.on_channel_activity(ChannelId::new(7)).await,
            RepostOutcome::NotConfigured
        );
        assert!(h.sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_activity_posts_single_copy() {
        let h = harness();
        h.manager.configure(channel(), text("hi")).await.unwrap();
        h.clock.advance(Duration::from_secs(7));
        h.sink.set_send_delay(Duration::from_millis(30));

        let (a, b) = tokio::join!(
            h.manager.on_channel_activity(channel()),
            h.manager.on_channel_activity(channel())
        );

        let posted = [a, b]
            .iter()
            .filter(|o| matches!(o, RepostOutcome::Posted(_)))
            .count();
        assert_eq!(posted, 1);
        assert!([a, b].contains(&RepostOutcome::CoolingDown));
        assert_eq!(h.sink.max_in_flight(), 1);
        assert_eq!(h.sink.live(channel()).len(), 1);
    }

    #[tokio::test]
    async fn test_reconfigure_waits_for_inflight_repost() {
        let h = harness();
        h.manager.configure(channel(), text("v1")).await.unwrap();
        h.clock.advance(Duration::from_secs(7));
        h.sink.set_send_delay(Duration::from_millis(50));

        let (activity, reconfigured) = tokio::join!(h.manager.on_channel_activity(channel()), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(h.manager.remove(channel()).await.unwrap());
            h.manager.configure(channel(), text("v2")).await.unwrap()
        });

        assert!(matches!(activity, RepostOutcome::Posted(_)));
        let RepostOutcome::Posted(latest) = reconfigured else {
            panic!("configure should post after the in-flight repost");
        };
        assert_eq!(h.sink.max_in_flight(), 1);
        assert_eq!(h.sink.live(channel()), vec![latest]);

        let record = h.manager.get(channel()).unwrap();
        assert_eq!(record.last_message_id, Some(latest));
        assert_eq!(record.content, text("v2"));
    }

    #[tokio::test]
    async fn test_permission_denied_deactivates() {
        let h = harness();
        h.manager.configure(channel(), text("hi")).await.unwrap();
        assert_eq!(h.store.len(STICKY_MESSAGES), 1);

        h.clock.advance(Duration::from_secs(7));
        h.sink.fail_next_send(SinkError::PermissionDenied);
        assert_eq!(h.manager.on_channel_activity(channel()).await, RepostOutcome::Deactivated);

        assert!(h.manager.get(channel()).is_none());
        assert_eq!(h.store.len(STICKY_MESSAGES), 0);

        h.clock.advance(Duration::from_secs(7));
        assert_eq!(h.manager.on_channel_activity(channel()).await, RepostOutcome::NotConfigured);
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_sticky() {
        let h = harness();
        h.manager.configure(channel(), text("hi")).await.unwrap();
        h.clock.advance(Duration::from_secs(7));

        h.sink.fail_next_send(SinkError::Transient("503".to_string()));
        assert_eq!(h.manager.on_channel_activity(channel()).await, RepostOutcome::Failed);
        assert!(h.manager.get(channel()).is_some());

        // Cooldown was not consumed by the failed attempt.
        assert!(matches!(
            h.manager.on_channel_activity(channel()).await,
            RepostOutcome::Posted(_)
        ));
        assert_eq!(h.sink.live(channel()).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delete_is_ignored() {
        let h = harness();
        h.manager.configure(channel(), text("hi")).await.unwrap();
        h.clock.advance(Duration::from_secs(7));

        h.sink.fail_next_delete(SinkError::PermissionDenied);
        assert!(matches!(
            h.manager.on_channel_activity(channel()).await,
            RepostOutcome::Posted(_)
        ));
        assert!(h.manager.get(channel()).is_some());
    }

    #[tokio::test]
    async fn test_reconfigure_bypasses_cooldown() {
        let h = harness();
        let RepostOutcome::Posted(first) = h.manager.configure(channel(), text("one")).await.unwrap() else {
            panic!("expected post");
        };

        h.clock.advance(Duration::from_secs(1));
        let RepostOutcome::Posted(second) = h.manager.configure(channel(), text("two")).await.unwrap()
        else {
            panic!("reconfigure should post regardless of cooldown");
        };

        assert_eq!(h.sink.deleted(), vec![first]);
        assert_eq!(h.sink.live(channel()), vec![second]);
        assert_eq!(h.manager.get(channel()).unwrap().content, text("two"));
    }

    #[tokio::test]
    async fn test_store_failure_leaves_cache_untouched() {
        let h = harness();
        h.store.set_unavailable(true);

        let result = h.manager.configure(channel(), text("hi")).await;
        assert!(matches!(result, Err(StickyError::Store(StoreError::Unavailable(_)))));
        assert!(h.manager.get(channel()).is_none());
        assert!(h.sink.events().is_empty());

        h.store.set_unavailable(false);
        h.manager.configure(channel(), text("hi")).await.unwrap();
        h.store.set_unavailable(true);
        assert!(h.manager.remove(channel()).await.is_err());
        assert!(h.manager.get(channel()).is_some());
    }

    #[tokio::test]
    async fn test_remove_keeps_posted_copy() {
        let h = harness();
        h.manager.configure(channel(), text("hi")).await.unwrap();

        assert!(h.manager.remove(channel()).await.unwrap());
        assert!(h.manager.get(channel()).is_none());
        assert_eq!(h.store.len(STICKY_MESSAGES), 0);
        assert!(h.sink.deleted().is_empty());
        assert_eq!(h.sink.live(channel()).len(), 1);

        assert!(!h.manager.remove(channel()).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let h = harness();
        let result = h.manager.configure(channel(), text("   ")).await;
        assert!(matches!(result, Err(StickyError::EmptyContent)));
        assert_eq!(h.store.len(STICKY_MESSAGES), 0);
    }

    #[tokio::test]
    async fn test_load_restores_cache_and_skips_corrupt_rows() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert(
                STICKY_MESSAGES,
                "42",
                json!({"channel_id": "42", "type": "embed", "title": "Rules", "description": "Be nice", "color": "red"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
        store
            .upsert(
                STICKY_MESSAGES,
                "43",
                json!({"channel_id": "43", "type": "poll"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();

        let manager = StickyManager::load(
            store,
            Arc::new(RecordingSink::new()),
            Arc::new(ManualClock::new()),
            COOLDOWN,
        )
        .await
        .unwrap();

        let records = manager.list();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].channel_id, channel());
        assert!(records[0].last_message_id.is_none());
        assert!(matches!(records[0].content, StickyContent::RichEmbed { .. }));
    }

    #[tokio::test]
    async fn test_load_survives_unparseable_row() {
        let store = SqliteStore::open(":memory:").unwrap();
        store.execute_init().unwrap();
        store
            .upsert(
                STICKY_MESSAGES,
                "42",
                json!({"channel_id": "42", "type": "text", "content": "hi"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
        store
            .run_blocking(|conn| {
                conn.execute(
                    "INSERT INTO documents (collection, key, body) VALUES ('sticky_messages', '43', 'not json')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let manager = StickyManager::load(
            Arc::new(store),
            Arc::new(RecordingSink::new()),
            Arc::new(ManualClock::new()),
            COOLDOWN,
        )
        .await
        .unwrap();

        let records = manager.list();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, text("hi"));
    }

    #[test]
    fn test_render_embed() {
        let content = StickyContent::RichEmbed {
            title: Some("Rules".to_string()),
            description: "Be nice".to_string(),
            color: Some("#FF0000".to_string()),
            image_url: None,
            thumbnail_url: Some("https://example.com/t.png".to_string()),
        };
        let embed = content.render().embed.unwrap();
        assert_eq!(embed.color, 0xFF0000);
        assert_eq!(embed.footer.as_deref(), Some(EMBED_FOOTER));
        assert_eq!(embed.thumbnail_url.as_deref(), Some("https://example.com/t.png"));
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color(None), DEFAULT_COLOR);
        assert_eq!(parse_color(Some("")), DEFAULT_COLOR);
        assert_eq!(parse_color(Some("#00ff00")), 0x00FF00);
        assert_eq!(parse_color(Some("Gold")), 0xF1C40F);
        assert_eq!(parse_color(Some("#GGGGGG")), DEFAULT_COLOR);
        assert_eq!(parse_color(Some("#1FFFFFF")), DEFAULT_COLOR);
        assert_eq!(parse_color(Some("chartreuse")), DEFAULT_COLOR);
    }
}
