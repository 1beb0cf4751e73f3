//! SQLite-backed cache tier with per-entry expiry

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::storage::error::StoreError;
use crate::storage::store::{VersionStore, filter_by_group};
use crate::version::record::{VersionMap, VersionRecord};

/// Schema migrations
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: expiry scans during rebuild
    &["CREATE INDEX IF NOT EXISTS idx_records_expires_at ON records(expires_at)"],
];

/// Cache of version records.
///
/// Every entry carries its own expiry. The identifier index used for
/// enumeration has a single expiry that is refreshed on every write, so an
/// idle cache eventually forgets both its entries and its index.
pub struct SqliteCache {
    conn: Mutex<Connection>,
    ttl_ms: i64,
}

impl SqliteCache {
    pub fn new(db_path: &Path, ttl_ms: i64) -> Result<Self, StoreError> {
        info!("Initializing cache database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn, ttl_ms)
    }

    /// Cache that lives only as long as the process
    pub fn in_memory(ttl_ms: i64) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, ttl_ms)
    }

    fn with_connection(conn: Connection, ttl_ms: i64) -> Result<Self, StoreError> {
        debug!("Database connection established");

        let cache = Self {
            conn: Mutex::new(conn),
            ttl_ms,
        };

        cache.create_schema()?;
        info!("Cache initialized successfully");

        Ok(cache)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::unavailable("cache connection lock poisoned"))
    }

    /// Get current timestamp in milliseconds since UNIX epoch
    fn current_timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        debug!("Creating database schema");

        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                identifier TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS record_index (identifier TEXT PRIMARY KEY)",
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                expires_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        Self::apply_migrations(&conn)?;

        debug!("Database schema created successfully");
        Ok(())
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), StoreError> {
        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (i, statements) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                for sql in *statements {
                    conn.execute(sql, [])?;
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i32;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
            debug!("Updated schema version to v{}", target_version);
        }

        Ok(())
    }

    fn encode(record: &VersionRecord) -> Result<String, StoreError> {
        Ok(serde_json::to_string(record)?)
    }

    fn upsert_entry(
        conn: &Connection,
        identifier: &str,
        payload: &str,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        conn.execute(
            r#"
            INSERT INTO records (identifier, payload, expires_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(identifier) DO UPDATE SET
                payload = excluded.payload,
                expires_at = excluded.expires_at
            "#,
            (identifier, payload, expires_at),
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO record_index (identifier) VALUES (?1)",
            [identifier],
        )?;
        Ok(())
    }

    fn refresh_index_expiry(conn: &Connection, expires_at: i64) -> Result<(), StoreError> {
        conn.execute(
            r#"
            INSERT INTO index_meta (id, expires_at) VALUES (1, ?1)
            ON CONFLICT(id) DO UPDATE SET expires_at = excluded.expires_at
            "#,
            [expires_at],
        )?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl VersionStore for SqliteCache {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn get(&self, identifier: &str) -> Result<Option<VersionRecord>, StoreError> {
        let now = Self::current_timestamp_ms();
        let conn = self.lock_conn()?;

        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM records WHERE identifier = ?1 AND expires_at > ?2",
                (identifier, now),
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, identifier: &str, record: &VersionRecord) -> Result<(), StoreError> {
        let payload = Self::encode(record)?;
        let expires_at = Self::current_timestamp_ms() + self.ttl_ms;

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        Self::upsert_entry(&tx, identifier, &payload, expires_at)?;
        Self::refresh_index_expiry(&tx, expires_at)?;
        tx.commit()?;

        debug!("Cached {} at {}", identifier, record.current);
        Ok(())
    }

    async fn list_all(&self) -> Result<VersionMap, StoreError> {
        let now = Self::current_timestamp_ms();
        let conn = self.lock_conn()?;

        let index_expires_at: Option<i64> = conn
            .query_row("SELECT expires_at FROM index_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        if !index_expires_at.is_some_and(|expires_at| expires_at > now) {
            return Ok(VersionMap::new());
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT i.identifier, r.payload FROM record_index i
            JOIN records r ON r.identifier = i.identifier
            WHERE r.expires_at > ?1
            "#,
        )?;

        let rows = stmt
            .query_map([now], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let records = rows
            .into_iter()
            .filter_map(|(identifier, payload)| {
                serde_json::from_str::<VersionRecord>(&payload)
                    .inspect_err(|e| warn!("Skipping undecodable cache entry {}: {}", identifier, e))
                    .ok()
                    .map(|record| (identifier, record))
            })
            .collect();

        Ok(records)
    }

    async fn list_by_prefix(&self, group_id: &str) -> Result<VersionMap, StoreError> {
        Ok(filter_by_group(self.list_all().await?, group_id))
    }

    async fn delete(&self, identifier: &str) -> Result<(), StoreError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM records WHERE identifier = ?1", [identifier])?;
        tx.execute("DELETE FROM record_index WHERE identifier = ?1", [identifier])?;
        tx.commit()?;

        debug!("Removed {} from cache", identifier);
        Ok(())
    }

    async fn health(&self) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    async fn rebuild(&self, records: &VersionMap) -> Result<(), StoreError> {
        let now = Self::current_timestamp_ms();
        let expires_at = now + self.ttl_ms;

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM record_index", [])?;
        tx.execute("DELETE FROM records WHERE expires_at <= ?1", [now])?;

        for (identifier, record) in records {
            match Self::encode(record) {
                Ok(payload) => Self::upsert_entry(&tx, identifier, &payload, expires_at)?,
                Err(e) => warn!("Skipping {} during cache rebuild: {}", identifier, e),
            }
        }

        Self::refresh_index_expiry(&tx, expires_at)?;
        tx.commit()?;

        info!("Cache rebuilt with {} records", records.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::record::Identifier;
    use crate::version::semver::SemVer;
    use chrono::Utc;
    use tempfile::TempDir;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn create_test_cache(ttl_ms: i64) -> (TempDir, SqliteCache) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let cache = SqliteCache::new(&db_path, ttl_ms).unwrap();
        (temp_dir, cache)
    }

    fn record(id: &str, version: &str) -> VersionRecord {
        VersionRecord::new(
            &Identifier::parse(id).unwrap(),
            SemVer::parse(version).unwrap(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn set_then_get_returns_record() {
        let (_temp_dir, cache) = create_test_cache(DAY_MS);
        let rec = record("12-api", "1.2.3");

        cache.set("12-api", &rec).await.unwrap();

        assert_eq!(cache.get("12-api").await.unwrap(), Some(rec));
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_identifier() {
        let (_temp_dir, cache) = create_test_cache(DAY_MS);
        assert_eq!(cache.get("12-missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_overwrites_existing_entry() {
        let (_temp_dir, cache) = create_test_cache(DAY_MS);

        cache.set("12-api", &record("12-api", "1.0.0")).await.unwrap();
        cache.set("12-api", &record("12-api", "1.0.1")).await.unwrap();

        let saved = cache.get("12-api").await.unwrap().unwrap();
        assert_eq!(saved.current.to_string(), "1.0.1");
        assert_eq!(cache.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let (_temp_dir, cache) = create_test_cache(100);

        cache.set("12-api", &record("12-api", "1.0.0")).await.unwrap();
        assert!(cache.get("12-api").await.unwrap().is_some());

        // Wait for the entry and the index to expire
        std::thread::sleep(std::time::Duration::from_millis(150));

        assert_eq!(cache.get("12-api").await.unwrap(), None);
        assert!(cache.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_by_prefix_filters_by_group() {
        let (_temp_dir, cache) = create_test_cache(DAY_MS);

        for id in ["12-api", "12-web", "123-api"] {
            cache.set(id, &record(id, "1.0.0")).await.unwrap();
        }

        let group = cache.list_by_prefix("12").await.unwrap();
        let mut ids: Vec<_> = group.keys().cloned().collect();
        ids.sort();
        assert_eq!(ids, vec!["12-api", "12-web"]);
    }

    #[tokio::test]
    async fn delete_removes_entry_and_index() {
        let (_temp_dir, cache) = create_test_cache(DAY_MS);

        cache.set("12-api", &record("12-api", "1.0.0")).await.unwrap();
        cache.delete("12-api").await.unwrap();

        assert_eq!(cache.get("12-api").await.unwrap(), None);
        assert!(cache.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rebuild_replaces_index() {
        let (_temp_dir, cache) = create_test_cache(DAY_MS);
        cache.set("1-old", &record("1-old", "0.1.0")).await.unwrap();

        let records: VersionMap = ["2-a", "2-b"]
            .into_iter()
            .map(|id| (id.to_string(), record(id, "3.0.0")))
            .collect();
        cache.rebuild(&records).await.unwrap();

        let listed = cache.list_all().await.unwrap();
        assert_eq!(listed, records);
    }

    #[tokio::test]
    async fn health_succeeds_on_open_database() {
        let cache = SqliteCache::in_memory(DAY_MS).unwrap();
        assert!(cache.health().await.is_ok());
    }

    #[test]
    fn reopening_database_keeps_schema_version() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        drop(SqliteCache::new(&db_path, DAY_MS).unwrap());
        let cache = SqliteCache::new(&db_path, DAY_MS).unwrap();

        let conn = cache.lock_conn().unwrap();
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i32);
    }
}
