//! In-memory store

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{BehaviorStore, VersionedModel};
use crate::error::Result;
use crate::models::BehaviorModel;

/// A user's entry; `model` is `None` once deleted, keeping the last version
#[derive(Debug)]
struct Slot {
    model: Option<BehaviorModel>,
    version: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    models: Mutex<HashMap<i64, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<i64, Slot>> {
        // A panicking writer never leaves a half-written entry behind
        self.models.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BehaviorStore for MemoryStore {
    fn load(&self, user_id: i64) -> Result<Option<VersionedModel>> {
        let models = self.guard();
        Ok(models.get(&user_id).and_then(|slot| {
            slot.model.as_ref().map(|model| VersionedModel {
                model: model.clone(),
                version: slot.version,
            })
        }))
    }

    fn compare_and_swap(&self, model: &BehaviorModel, expected: Option<u64>) -> Result<bool> {
        let mut models = self.guard();
        let slot = models.get(&model.user_id);
        let live = slot.and_then(|s| s.model.as_ref().map(|_| s.version));
        if live != expected {
            return Ok(false);
        }
        let version = slot.map_or(1, |s| s.version + 1);
        models.insert(
            model.user_id,
            Slot {
                model: Some(model.clone()),
                version,
            },
        );
        Ok(true)
    }

    fn delete(&self, user_id: i64) -> Result<bool> {
        let mut models = self.guard();
        Ok(models
            .get_mut(&user_id)
            .and_then(|slot| slot.model.take())
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_insert_then_swap() {
        let store = MemoryStore::new();
        let mut model = BehaviorModel::new(1, Utc::now());

        assert!(store.load(1).unwrap().is_none());
        assert!(store.compare_and_swap(&model, None).unwrap());
        assert_eq!(store.load(1).unwrap().unwrap().version, 1);

        model.data_quality.transaction_count = 5;
        assert!(store.compare_and_swap(&model, Some(1)).unwrap());
        let loaded = store.load(1).unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.model.data_quality.transaction_count, 5);
    }

    #[test]
    fn test_stale_version_is_rejected() {
        let store = MemoryStore::new();
        let model = BehaviorModel::new(1, Utc::now());
        assert!(store.compare_and_swap(&model, None).unwrap());
        // Second creator loses
        assert!(!store.compare_and_swap(&model, None).unwrap());
        assert!(store.compare_and_swap(&model, Some(1)).unwrap());
        assert!(!store.compare_and_swap(&model, Some(1)).unwrap());
    }

    #[test]
    fn test_delete() {
        let store = MemoryStore::new();
        let model = BehaviorModel::new(3, Utc::now());
        store.compare_and_swap(&model, None).unwrap();
        assert!(store.delete(3).unwrap());
        assert!(!store.delete(3).unwrap());
        assert!(store.load(3).unwrap().is_none());
    }

    #[test]
    fn test_recreated_model_does_not_reuse_versions() {
        let store = MemoryStore::new();
        let model = BehaviorModel::new(3, Utc::now());
        assert!(store.compare_and_swap(&model, None).unwrap());
        let stale = store.load(3).unwrap().unwrap().version;

        store.delete(3).unwrap();
        assert!(!store.compare_and_swap(&model, Some(stale)).unwrap());
        assert!(store.compare_and_swap(&model, None).unwrap());
        assert_eq!(store.load(3).unwrap().unwrap().version, 2);

        // A writer that read before the delete still loses
        assert!(!store.compare_and_swap(&model, Some(stale)).unwrap());
        assert!(store.compare_and_swap(&model, Some(2)).unwrap());
    }
}
