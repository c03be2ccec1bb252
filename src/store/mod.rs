//! Document store abstraction.
//!
//! Records are schema-less JSON documents grouped into collections and
//! addressed by a string key. Components decode them into typed structs at
//! this boundary via [`decode`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

#[cfg(test)]
pub mod memory;
pub mod sqlite;

#[cfg(test)]
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const STICKY_MESSAGES: &str = "sticky_messages";
pub const SMART_TRIGGERS: &str = "smart_triggers";
pub const PREMIUM_USERS: &str = "premium_users";

pub type Document = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt document in {collection}/{key}: {reason}")]
    Corrupt {
        collection: String,
        key: String,
        reason: String,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Field-equality filter; an empty filter matches every document.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    fields: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.fields
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError>;

    /// Documents in insertion order.
    async fn list(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Merges `fields` into the document at `key`, creating it if absent.
    async fn upsert(&self, collection: &str, key: &str, fields: Document) -> Result<(), StoreError>;

    /// Returns the number of documents removed.
    async fn delete(&self, collection: &str, key: &str) -> Result<usize, StoreError>;
}

/// Serializes a record into the field map handed to [`KeyValueStore::upsert`].
pub fn encode<T: Serialize>(
    collection: &str,
    key: &str,
    record: &T,
) -> Result<Document, StoreError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Corrupt {
            collection: collection.to_string(),
            key: key.to_string(),
            reason: format!("expected an object, got {}", other),
        }),
        Err(e) => Err(StoreError::Corrupt {
            collection: collection.to_string(),
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

pub fn decode<T: DeserializeOwned>(
    collection: &str,
    key: &str,
    doc: Document,
) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| StoreError::Corrupt {
        collection: collection.to_string(),
        key: key.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn merge_into(target: &mut Document, fields: Document) {
    for (k, v) in fields {
        target.insert(k, v);
    }
}
