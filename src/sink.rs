//! Outbound message delivery.

use async_trait::async_trait;
use serenity::all::{ChannelId, CreateEmbed, CreateEmbedFooter, CreateMessage, MessageId};
use serenity::http::Http;
use serenity::model::ModelError;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("missing permission to post in channel")]
    PermissionDenied,
    #[error("message or channel not found")]
    NotFound,
    #[error("transient send failure: {0}")]
    Transient(String),
}

impl From<serenity::Error> for SinkError {
    fn from(e: serenity::Error) -> Self {
        match &e {
            serenity::Error::Http(http_err) => match http_err.status_code().map(|s| s.as_u16()) {
                Some(403) => SinkError::PermissionDenied,
                Some(404) => SinkError::NotFound,
                _ => SinkError::Transient(e.to_string()),
            },
            serenity::Error::Model(ModelError::InvalidPermissions { .. }) => {
                SinkError::PermissionDenied
            }
            _ => SinkError::Transient(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedSpec {
    pub title: Option<String>,
    pub description: String,
    pub color: u32,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    pub content: Option<String>,
    pub embed: Option<EmbedSpec>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embed: None,
        }
    }

    pub fn embed(embed: EmbedSpec) -> Self {
        Self {
            content: None,
            embed: Some(embed),
        }
    }

    fn into_builder(self) -> CreateMessage {
        let mut builder = CreateMessage::new();
        if let Some(content) = self.content {
            builder = builder.content(content);
        }
        if let Some(spec) = self.embed {
            let mut embed = CreateEmbed::new()
                .description(spec.description)
                .color(spec.color);
            if let Some(title) = spec.title {
                embed = embed.title(title);
            }
            if let Some(url) = spec.image_url {
                embed = embed.image(url);
            }
            if let Some(url) = spec.thumbnail_url {
                embed = embed.thumbnail(url);
            }
            if let Some(footer) = spec.footer {
                embed = embed.footer(CreateEmbedFooter::new(footer));
            }
            builder = builder.embed(embed);
        }
        builder
    }
}

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, channel_id: ChannelId, message: OutboundMessage) -> Result<MessageId, SinkError>;

    /// Best-effort delete. `Ok(false)` when the message was already gone.
    async fn delete(&self, channel_id: ChannelId, message_id: MessageId) -> Result<bool, SinkError>;
}

/// Delivers messages through the Discord REST API.
pub struct SerenitySink {
    http: Arc<Http>,
}

impl SerenitySink {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MessageSink for SerenitySink {
    async fn send(&self, channel_id: ChannelId, message: OutboundMessage) -> Result<MessageId, SinkError> {
        let sent = channel_id
            .send_message(&self.http, message.into_builder())
            .await?;
        Ok(sent.id)
    }

    async fn delete(&self, channel_id: ChannelId, message_id: MessageId) -> Result<bool, SinkError> {
        match channel_id.delete_message(&self.http, message_id).await {
            Ok(()) => Ok(true),
            Err(e) => match SinkError::from(e) {
                SinkError::NotFound => Ok(false),
                other => Err(other),
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SinkEvent {
        Sent(ChannelId, MessageId, OutboundMessage),
        Deleted(ChannelId, MessageId),
    }

    /// Records every call; failures can be queued per operation.
    #[derive(Default)]
    pub struct RecordingSink {
        next_id: AtomicU64,
        events: Mutex<Vec<SinkEvent>>,
        send_failures: Mutex<VecDeque<SinkError>>,
        delete_failures: Mutex<VecDeque<SinkError>>,
        send_delay: Mutex<Option<Duration>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self {
                next_id: AtomicU64::new(1000),
                ..Default::default()
            }
        }

        pub fn fail_next_send(&self, error: SinkError) {
            self.send_failures.lock().unwrap().push_back(error);
        }

        pub fn fail_next_delete(&self, error: SinkError) {
            self.delete_failures.lock().unwrap().push_back(error);
        }

        pub fn set_send_delay(&self, delay: Duration) {
            *self.send_delay.lock().unwrap() = Some(delay);
        }

        pub fn events(&self) -> Vec<SinkEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn sent(&self) -> Vec<(ChannelId, MessageId, OutboundMessage)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    SinkEvent::Sent(c, m, msg) => Some((c, m, msg)),
                    _ => None,
                })
                .collect()
        }

        pub fn deleted(&self) -> Vec<MessageId> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    SinkEvent::Deleted(_, m) => Some(m),
                    _ => None,
                })
                .collect()
        }

        /// Messages sent and not deleted since.
        pub fn live(&self, channel_id: ChannelId) -> Vec<MessageId> {
            let deleted = self.deleted();
            self.sent()
                .into_iter()
                .filter(|(c, m, _)| *c == channel_id && !deleted.contains(m))
                .map(|(_, m, _)| m)
                .collect()
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, channel_id: ChannelId, message: OutboundMessage) -> Result<MessageId, SinkError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let delay = *self.send_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let failure = self.send_failures.lock().unwrap().pop_front();
            let result = match failure {
                Some(err) => Err(err),
                None => {
                    let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
                    self.events
                        .lock()
                        .unwrap()
                        .push(SinkEvent::Sent(channel_id, id, message));
                    Ok(id)
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn delete(&self, channel_id: ChannelId, message_id: MessageId) -> Result<bool, SinkError> {
            if let Some(err) = self.delete_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            self.events
                .lock()
                .unwrap()
                .push(SinkEvent::Deleted(channel_id, message_id));
            Ok(true)
        }
    }
}
