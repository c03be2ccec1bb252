use super::{merge_into, Document, Filter, KeyValueStore, StoreError};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// SQLite-backed document store: one `documents` table with JSON bodies.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && path != ":memory:" {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> Result<(), StoreError> {
        info!("Store: Initializing schema...");
        let sql = "
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection, key)
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection);
        ";
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(sql)?;
        debug!("Store: Schema initialized successfully");
        Ok(())
    }

    /// Runs `f` against the connection on the blocking pool.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {}", e)))?
    }
}

fn parse_body(collection: &str, key: &str, body: &str) -> Result<Document, StoreError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Corrupt {
            collection: collection.to_string(),
            key: key.to_string(),
            reason: "body is not a JSON object".to_string(),
        }),
        Err(e) => Err(StoreError::Corrupt {
            collection: collection.to_string(),
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn select_one(conn: &Connection, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
            (collection, key),
            |row| row.get(0),
        )
        .optional()?;
    body.map(|b| parse_body(collection, key, &b)).transpose()
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.run_blocking(move |conn| select_one(conn, &collection, &key))
            .await
    }

    async fn list(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.run_blocking(move |conn| {
            let mut stmt = conn
                .prepare("SELECT key, body FROM documents WHERE collection = ?1 ORDER BY rowid")?;
            let rows = stmt.query_map([&collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut results = Vec::new();
            for row in rows {
                let (key, body) = row?;
                // One unreadable row must not hide the rest of the collection.
                let doc = match parse_body(&collection, &key, &body) {
                    Ok(doc) => doc,
                    Err(e) => {
                        warn!("Store: skipping unreadable row: {}", e);
                        continue;
                    }
                };
                if filter.matches(&doc) {
                    results.push(doc);
                }
            }
            debug!("Store: list {} returned {} documents", collection, results.len());
            Ok(results)
        })
        .await
    }

    async fn upsert(&self, collection: &str, key: &str, fields: Document) -> Result<(), StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.run_blocking(move |conn| {
            let mut doc = select_one(conn, &collection, &key)?.unwrap_or_default();
            merge_into(&mut doc, fields);
            let body = Value::Object(doc).to_string();
            conn.execute(
                "INSERT INTO documents (collection, key, body, updated_at)
                 VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
                 ON CONFLICT(collection, key) DO UPDATE SET body = ?3, updated_at = CURRENT_TIMESTAMP",
                (&collection, &key, &body),
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<usize, StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.run_blocking(move |conn| {
            let count = conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND key = ?2",
                (&collection, &key),
            )?;
            Ok(count)
        })
        .await
    }
}
