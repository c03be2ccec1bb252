use super::{merge_into, Document, Filter, KeyValueStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// In-process store for tests, switchable to "unavailable".
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<(String, Document)>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self, collection: &str) -> usize {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections.get(collection).map_or(0, Vec::len)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        self.check()?;
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        Ok(collections
            .get(collection)
            .and_then(|rows| rows.iter().find(|(k, _)| k == key))
            .map(|(_, doc)| doc.clone()))
    }

    async fn list(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.check()?;
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        Ok(collections
            .get(collection)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, doc)| filter.matches(doc))
                    .map(|(_, doc)| doc.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert(&self, collection: &str, key: &str, fields: Document) -> Result<(), StoreError> {
        self.check()?;
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let rows = collections.entry(collection.to_string()).or_default();
        match rows.iter_mut().find(|(k, _)| k == key) {
            Some((_, doc)) => merge_into(doc, fields),
            None => rows.push((key.to_string(), fields)),
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<usize, StoreError> {
        self.check()?;
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let Some(rows) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|(k, _)| k != key);
        Ok(before - rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_merges_and_keeps_order() {
        let store = MemoryStore::new();
        store.upsert("c", "a", doc(json!({"x": 1}))).await.unwrap();
        store.upsert("c", "b", doc(json!({"x": 2}))).await.unwrap();
        store.upsert("c", "a", doc(json!({"y": 3}))).await.unwrap();

        let a = store.get("c", "a").await.unwrap().unwrap();
        assert_eq!(a.get("x"), Some(&json!(1)));
        assert_eq!(a.get("y"), Some(&json!(3)));

        let all = store.list("c", &Filter::all()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].get("x"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get("c", "a").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert_eq!(store.delete("c", "a").await.unwrap(), 0);
    }
}
