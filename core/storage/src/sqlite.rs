//! SQLite storage adapter.
//!
//! Persists metadata and payload in two tables keyed by the logical id:
//! `storage_metadata` holds the metadata columns, `storage_data` the raw
//! encrypted bytes, with a cascading delete from the former to the latter.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::adapter::{HealthStatus, StorageAdapter, StoredObject};
use crate::helpers::validate_store;
use crate::metadata::{EncryptionMetadata, StorageMetadata, StorageResult};
use crate::reference::{resolve_keyed, Reference, SQLITE_SCHEME};
use tacostore_common::{Error, Result};

const SCHEME: &str = SQLITE_SCHEME;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS storage_metadata (
        id TEXT PRIMARY KEY,
        content_type TEXT NOT NULL,
        size INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        custom_metadata TEXT,
        message_kit BLOB NOT NULL,
        conditions TEXT NOT NULL,
        backend_hash TEXT
    );

    CREATE TABLE IF NOT EXISTS storage_data (
        id TEXT PRIMARY KEY REFERENCES storage_metadata(id) ON DELETE CASCADE,
        data BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_metadata_created ON storage_metadata(created_at, id);
"#;

/// SQLite adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`.
    pub path: PathBuf,
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }
}

/// SQLite storage adapter.
///
/// References look like `sqlite://<path>#<id>`; the bare id works too.
/// Queries run on the blocking thread pool, never on a runtime worker.
pub struct SqliteAdapter {
    path: PathBuf,
    location: String,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteAdapter {
    /// Create an adapter for the database at `config.path`.
    ///
    /// Nothing is opened until `initialize`.
    pub fn new(config: SqliteConfig) -> Self {
        let location = config.path.to_string_lossy().into_owned();
        Self {
            path: config.path,
            location,
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on the blocking pool with the connection slot locked.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Option<Connection>) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::Adapter("SQLite connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::Adapter(format!("SQLite task failed: {}", e)))?
    }

    /// Run `f` against the open connection.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        self.blocking(|slot| match slot.as_mut() {
            Some(conn) => f(conn),
            None => Err(Error::Adapter("sqlite adapter is not initialized".to_string())),
        })
        .await
    }
}

fn open(path: &Path, location: &str) -> Result<Connection> {
    if location != ":memory:" {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let conn = Connection::open(path).map_err(|e| {
        Error::Adapter(format!("Failed to open SQLite database {}: {}", location, e))
    })?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .and_then(|_| conn.execute_batch(SCHEMA))
        .map_err(|e| Error::Adapter(format!("Failed to prepare SQLite schema: {}", e)))?;
    Ok(conn)
}

fn contains(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM storage_metadata WHERE id = ?1 LIMIT 1",
        [id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

/// Id of the object `locator` names. A stored id wins over any reference
/// reading of the same string.
fn resolve(conn: &Connection, location: &str, locator: &str) -> Result<String> {
    if contains(conn, locator).map_err(sqlite_err)? {
        return Ok(locator.to_string());
    }
    resolve_keyed(SCHEME, location, locator).map(str::to_string)
}

fn sqlite_err(e: rusqlite::Error) -> Error {
    Error::backend("sqlite", e)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed width, so text order is time order.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Raw column values of a metadata row joined with its data row.
struct ObjectRow {
    id: String,
    content_type: String,
    size: i64,
    created_at: String,
    custom_metadata: Option<String>,
    message_kit: Vec<u8>,
    conditions: String,
    backend_hash: Option<String>,
    data: Vec<u8>,
}

impl ObjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content_type: row.get(1)?,
            size: row.get(2)?,
            created_at: row.get(3)?,
            custom_metadata: row.get(4)?,
            message_kit: row.get(5)?,
            conditions: row.get(6)?,
            backend_hash: row.get(7)?,
            data: row.get(8)?,
        })
    }

    fn into_object(self) -> Result<StoredObject> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| Error::Retrieval {
                message: format!("Invalid created_at for {}: {}", self.id, e),
                source: Some(Box::new(e)),
            })?
            .with_timezone(&Utc);

        let custom_metadata = self
            .custom_metadata
            .as_deref()
            .map(serde_json::from_str::<Map<String, Value>>)
            .transpose()
            .map_err(|e| Error::Retrieval {
                message: format!("Invalid custom metadata for {}: {}", self.id, e),
                source: Some(Box::new(e)),
            })?;

        let conditions: Value =
            serde_json::from_str(&self.conditions).map_err(|e| Error::Retrieval {
                message: format!("Invalid conditions for {}: {}", self.id, e),
                source: Some(Box::new(e)),
            })?;

        Ok(StoredObject {
            encrypted_payload: self.data,
            metadata: StorageMetadata {
                id: self.id,
                content_type: self.content_type,
                size: self.size.max(0) as u64,
                created_at,
                custom_metadata,
                encryption_metadata: EncryptionMetadata {
                    message_kit: self.message_kit,
                    conditions,
                },
                backend_hash: self.backend_hash,
            },
        })
    }
}

#[async_trait]
impl StorageAdapter for SqliteAdapter {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn scheme(&self) -> &str {
        SCHEME
    }

    async fn initialize(&self) -> Result<()> {
        let path = self.path.clone();
        let location = self.location.clone();
        let opened = self
            .blocking(move |slot| {
                if slot.is_some() {
                    return Ok(false);
                }
                *slot = Some(open(&path, &location)?);
                Ok(true)
            })
            .await?;
        if opened {
            info!(path = %self.location, "SQLite adapter initialized");
        }
        Ok(())
    }

    async fn store(&self, payload: Vec<u8>, metadata: StorageMetadata) -> Result<StorageResult> {
        validate_store(&payload, &metadata)?;

        let custom = metadata
            .custom_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conditions = serde_json::to_string(&metadata.encryption_metadata.conditions)?;
        let size = payload.len();
        let row = metadata.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(sqlite_err)?;
            tx.execute(
                r#"
                INSERT INTO storage_metadata
                (id, content_type, size, created_at, custom_metadata, message_kit, conditions, backend_hash)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO UPDATE SET
                    content_type = excluded.content_type,
                    size = excluded.size,
                    created_at = excluded.created_at,
                    custom_metadata = excluded.custom_metadata,
                    message_kit = excluded.message_kit,
                    conditions = excluded.conditions,
                    backend_hash = excluded.backend_hash
                "#,
                params![
                    row.id,
                    row.content_type,
                    row.size as i64,
                    format_timestamp(&row.created_at),
                    custom,
                    row.encryption_metadata.message_kit,
                    conditions,
                    row.backend_hash,
                ],
            )
            .map_err(sqlite_err)?;
            tx.execute(
                r#"
                INSERT INTO storage_data (id, data) VALUES (?1, ?2)
                ON CONFLICT(id) DO UPDATE SET data = excluded.data
                "#,
                params![row.id, payload],
            )
            .map_err(sqlite_err)?;
            tx.commit().map_err(sqlite_err)
        })
        .await
        .map_err(|e| e.into_storage("Failed to write object"))?;

        debug!(id = %metadata.id, size, "Stored object in SQLite");

        Ok(StorageResult {
            id: metadata.id.clone(),
            reference: Reference::format(SCHEME, &self.location, Some(&metadata.id)),
            metadata,
        })
    }

    async fn retrieve(&self, locator: &str) -> Result<StoredObject> {
        let location = self.location.clone();
        let locator = locator.to_string();

        let row = self
            .with_conn(move |conn| {
                let id = resolve(conn, &location, &locator)
                    .map_err(|e| e.into_retrieval("Failed to read object"))?;
                conn.query_row(
                    r#"
                    SELECT m.id, m.content_type, m.size, m.created_at, m.custom_metadata,
                           m.message_kit, m.conditions, m.backend_hash, d.data
                    FROM storage_metadata m
                    JOIN storage_data d ON d.id = m.id
                    WHERE m.id = ?1
                    "#,
                    [&id],
                    ObjectRow::from_row,
                )
                .optional()
                .map_err(|e| sqlite_err(e).into_retrieval("Failed to read object"))?
                .ok_or_else(|| Error::NotFound(format!("Object not found: {}", id)))
            })
            .await?;

        row.into_object()
    }

    async fn delete(&self, locator: &str) -> Result<bool> {
        let location = self.location.clone();
        let locator = locator.to_string();

        self.with_conn(move |conn| {
            let Ok(id) = resolve(conn, &location, &locator) else {
                return Ok(false);
            };
            let removed = conn
                .execute("DELETE FROM storage_metadata WHERE id = ?1", [&id])
                .map_err(|e| sqlite_err(e).into_storage("Failed to delete object"))?;
            debug!(id = %id, removed, "Deleted object from SQLite");
            Ok(removed > 0)
        })
        .await
    }

    async fn exists(&self, locator: &str) -> Result<bool> {
        let location = self.location.clone();
        let locator = locator.to_string();

        self.with_conn(move |conn| {
            let Ok(id) = resolve(conn, &location, &locator) else {
                return Ok(false);
            };
            match contains(conn, &id) {
                Ok(found) => Ok(found),
                Err(e) => {
                    warn!(id = %id, error = %e, "SQLite existence check failed");
                    Ok(false)
                }
            }
        })
        .await
    }

    fn supports_list(&self) -> bool {
        true
    }

    async fn list(&self, limit: Option<usize>, offset: Option<usize>) -> Result<Vec<String>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1);
        let offset = offset.unwrap_or(0).min(i64::MAX as usize) as i64;

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id FROM storage_metadata
                    ORDER BY created_at ASC, id ASC
                    LIMIT ?1 OFFSET ?2
                    "#,
                )
                .map_err(sqlite_err)?;
            let ids = stmt
                .query_map(params![limit, offset], |row| row.get::<_, String>(0))
                .map_err(sqlite_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sqlite_err)?;
            Ok(ids)
        })
        .await
        .map_err(|e| e.into_retrieval("Failed to list objects"))
    }

    async fn health(&self) -> Result<HealthStatus> {
        let location = self.location.clone();

        self.blocking(move |slot| {
            let Some(conn) = slot.as_ref() else {
                return Ok(HealthStatus::unhealthy("sqlite adapter is not initialized"));
            };
            let status = match conn.query_row("SELECT COUNT(*) FROM storage_metadata", [], |row| {
                row.get::<_, i64>(0)
            }) {
                Ok(count) => HealthStatus::healthy(Map::new())
                    .with_detail("path", location)
                    .with_detail("objects", count),
                Err(e) => HealthStatus::unhealthy(e).with_detail("path", location),
            };
            Ok(status)
        })
        .await
    }

    async fn cleanup(&self) -> Result<()> {
        let location = self.location.clone();

        self.blocking(move |slot| {
            if let Some(conn) = slot.take() {
                if let Err((_, e)) = conn.close() {
                    warn!(path = %location, error = %e, "Failed to close SQLite connection");
                }
                debug!(path = %location, "SQLite adapter cleaned up");
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::sample_metadata;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn adapter(temp: &TempDir) -> SqliteAdapter {
        let adapter = SqliteAdapter::new(SqliteConfig::new(temp.path().join("store.db")));
        adapter.initialize().await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_sqlite_store_retrieve() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp).await;
        let payload = b"encrypted bytes".to_vec();
        let metadata = sample_metadata("doc-1", &payload);

        let result = adapter.store(payload.clone(), metadata.clone()).await.unwrap();
        assert_eq!(
            result.reference,
            format!("sqlite://{}#doc-1", temp.path().join("store.db").display())
        );

        let object = adapter.retrieve("doc-1").await.unwrap();
        assert_eq!(object.encrypted_payload, payload);
        assert_eq!(object.metadata.content_type, "text/plain");
        assert_eq!(object.metadata.custom("author").unwrap(), "test-user");
        assert_eq!(
            object.metadata.encryption_metadata,
            metadata.encryption_metadata
        );

        let by_reference = adapter.retrieve(&result.reference).await.unwrap();
        assert_eq!(by_reference.metadata.id, "doc-1");
    }

    #[tokio::test]
    async fn test_sqlite_absence_and_delete() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp).await;

        assert!(matches!(
            adapter.retrieve("missing").await,
            Err(Error::NotFound(_))
        ));
        assert!(!adapter.delete("missing").await.unwrap());
        assert!(!adapter.exists("missing").await.unwrap());

        adapter
            .store(vec![1, 2], sample_metadata("doc", &[1, 2]))
            .await
            .unwrap();
        assert!(adapter.exists("doc").await.unwrap());
        assert!(adapter.delete("doc").await.unwrap());
        assert!(!adapter.exists("doc").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_data() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp).await;
        adapter
            .store(vec![1, 2], sample_metadata("doc", &[1, 2]))
            .await
            .unwrap();

        adapter.delete("doc").await.unwrap();

        let remaining: i64 = adapter
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM storage_data", [], |row| row.get(0))
                    .map_err(sqlite_err)
            })
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_sqlite_ids_with_reference_characters() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp).await;

        for id in ["https://example.com/doc", "report#2024", "sqlite:///elsewhere.db#doc"] {
            let result = adapter
                .store(vec![7], sample_metadata(id, &[7]))
                .await
                .unwrap();

            assert_eq!(adapter.retrieve(id).await.unwrap().metadata.id, id);
            assert_eq!(
                adapter.retrieve(&result.reference).await.unwrap().metadata.id,
                id
            );
            assert!(adapter.exists(id).await.unwrap());
            assert!(adapter.exists(&result.reference).await.unwrap());
        }

        assert!(adapter.delete("https://example.com/doc").await.unwrap());
        assert!(!adapter.exists("https://example.com/doc").await.unwrap());
        let reference = Reference::format(SCHEME, &adapter.location, Some("report#2024"));
        assert!(adapter.delete(&reference).await.unwrap());
        assert!(!adapter.exists("report#2024").await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_overwrite() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp).await;

        adapter
            .store(vec![1; 3], sample_metadata("doc", &[1; 3]))
            .await
            .unwrap();
        let mut second = sample_metadata("doc", &[2; 7]);
        second.content_type = "application/json".to_string();
        adapter.store(vec![2; 7], second).await.unwrap();

        let object = adapter.retrieve("doc").await.unwrap();
        assert_eq!(object.encrypted_payload, vec![2; 7]);
        assert_eq!(object.metadata.size, 7);
        assert_eq!(object.metadata.content_type, "application/json");
        assert_eq!(adapter.list(None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_list_orders_by_creation() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp).await;
        let base = Utc::now();

        for (i, id) in ["c", "a", "b"].iter().enumerate() {
            let mut metadata = sample_metadata(id, &[1]);
            metadata.created_at = base + Duration::seconds(i as i64);
            adapter.store(vec![1], metadata).await.unwrap();
        }

        assert_eq!(adapter.list(None, None).await.unwrap(), vec!["c", "a", "b"]);
        assert_eq!(adapter.list(Some(2), Some(1)).await.unwrap(), vec!["a", "b"]);
        assert!(adapter.list(Some(2), Some(5)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let adapter = adapter(&temp).await;
            adapter
                .store(vec![5; 5], sample_metadata("kept", &[5; 5]))
                .await
                .unwrap();
            adapter.cleanup().await.unwrap();
        }

        let reopened = adapter(&temp).await;
        assert_eq!(
            reopened.retrieve("kept").await.unwrap().encrypted_payload,
            vec![5; 5]
        );
    }

    #[tokio::test]
    async fn test_sqlite_invalid_references() {
        let temp = TempDir::new().unwrap();
        let adapter = adapter(&temp).await;

        assert!(matches!(
            adapter.retrieve("sqlite:///elsewhere.db#doc").await,
            Err(Error::InvalidReference(_))
        ));
        assert!(!adapter.exists("memory://x#doc").await.unwrap());
        assert!(!adapter.delete("sqlite:///elsewhere.db#doc").await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_uninitialized() {
        let adapter = SqliteAdapter::new(SqliteConfig::in_memory());

        assert!(matches!(adapter.exists("doc").await, Err(Error::Adapter(_))));
        assert!(!adapter.health().await.unwrap().healthy);
        adapter.cleanup().await.unwrap();

        adapter.initialize().await.unwrap();
        adapter.initialize().await.unwrap();
        let health = adapter.health().await.unwrap();
        assert!(health.healthy);
        assert_eq!(health.details.unwrap()["objects"], 0);
    }
}
