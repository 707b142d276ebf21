//! Behavior model persistence
//!
//! Every write is a compare-and-swap on an integer version held next to the
//! snapshot, so the engine can detect a concurrent writer and retry instead of
//! silently dropping its update.
//!
//! Backends:
//! - `memory` - mutex-guarded map, for tests and embedding
//! - `sqlite` - r2d2-pooled SQLite with the model stored as JSON

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::BehaviorModel;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{DbConn, DbPool, SqliteStore};

/// A model snapshot and the version it was read at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedModel {
    pub model: BehaviorModel,
    /// Starts at 1 on first insert, bumped on every successful swap. Never
    /// reused for a user, even after `delete`
    pub version: u64,
}

/// Versioned storage for per-user behavior models
pub trait BehaviorStore: Send + Sync {
    /// Current snapshot for a user, if one exists
    fn load(&self, user_id: i64) -> Result<Option<VersionedModel>>;

    /// Write `model` if the stored version still equals `expected`
    ///
    /// `expected = None` means "only if no model exists yet". Returns `false`
    /// when another writer got there first.
    fn compare_and_swap(&self, model: &BehaviorModel, expected: Option<u64>) -> Result<bool>;

    /// Remove a user's model, returning whether one existed
    ///
    /// The last version is remembered, so a model recreated later continues
    /// from it and a writer still holding a pre-delete version cannot swap.
    fn delete(&self, user_id: i64) -> Result<bool>;
}
