//! SQLite store with connection pooling
//!
//! One row per user: the serialized `BehaviorModel` plus its version. Swaps
//! are a single conditional `UPDATE`/`INSERT OR IGNORE`, so the version check
//! and the write are atomic without holding a transaction across the fold.
//!
//! Deleting a model leaves its last version in `model_tombstones`; a model
//! recreated for that user starts one above it, so versions never repeat.

use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use super::{BehaviorStore, VersionedModel};
use crate::error::{Error, Result};
use crate::models::BehaviorModel;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Behavior model store backed by a SQLite file
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations
    pub fn new(path: &str) -> Result<Self> {
        // Concurrent writers wait on the file lock instead of failing immediately
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
            Ok(())
        });
        let pool = Pool::builder().max_size(10).build(manager)?;

        let store = Self {
            pool,
            db_path: path.to_string(),
        };
        store.run_migrations()?;
        info!(path, "Opened behavior model store");

        Ok(store)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` so every pooled
    /// connection sees the same database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "steady_test_{}_{}.db",
            std::process::id(),
            id
        ));

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path.to_string_lossy())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            CREATE TABLE IF NOT EXISTS behavior_models (
                user_id INTEGER PRIMARY KEY,
                version INTEGER NOT NULL,
                model TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS model_tombstones (
                user_id INTEGER PRIMARY KEY,
                version INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    /// Number of stored models
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM behavior_models", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// All user ids with a stored model, ascending
    pub fn user_ids(&self) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT user_id FROM behavior_models ORDER BY user_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }
}

impl BehaviorStore for SqliteStore {
    fn load(&self, user_id: i64) -> Result<Option<VersionedModel>> {
        let conn = self.conn()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT version, model FROM behavior_models WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((version, json)) => {
                let model: BehaviorModel = serde_json::from_str(&json)?;
                if model.user_id != user_id {
                    return Err(Error::InvalidData(format!(
                        "Stored model for user {} belongs to user {}",
                        user_id, model.user_id
                    )));
                }
                Ok(Some(VersionedModel {
                    model,
                    version: version as u64,
                }))
            }
            None => Ok(None),
        }
    }

    fn compare_and_swap(&self, model: &BehaviorModel, expected: Option<u64>) -> Result<bool> {
        let conn = self.conn()?;
        let json = serde_json::to_string(model)?;
        let now = Utc::now().to_rfc3339();

        let changed = match expected {
            None => conn.execute(
                "INSERT OR IGNORE INTO behavior_models (user_id, version, model, updated_at)
                 VALUES (
                     ?1,
                     COALESCE((SELECT version FROM model_tombstones WHERE user_id = ?1), 0) + 1,
                     ?2,
                     ?3
                 )",
                params![model.user_id, json, now],
            )?,
            Some(version) => conn.execute(
                "UPDATE behavior_models
                 SET version = version + 1, model = ?2, updated_at = ?3
                 WHERE user_id = ?1 AND version = ?4",
                params![model.user_id, json, now, version as i64],
            )?,
        };

        debug!(
            user_id = model.user_id,
            ?expected,
            swapped = changed == 1,
            "Compare-and-swap"
        );
        Ok(changed == 1)
    }

    fn delete(&self, user_id: i64) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO model_tombstones (user_id, version)
             SELECT user_id, version FROM behavior_models WHERE user_id = ?1",
            params![user_id],
        )?;
        let changed = tx.execute(
            "DELETE FROM behavior_models WHERE user_id = ?1",
            params![user_id],
        )?;
        tx.commit()?;
        Ok(changed > 0)
    }
}
