//! Workflow record store with optimistic versioning
//!
//! The store owns the canonical copy of every record. Callers work on
//! snapshots; writes go through [`WorkflowStore::mutate`], which
//! re-reads the authoritative record under the lock, applies the
//! closure, and bumps `version`. A caller holding a stale snapshot can
//! pass its expected version and will get `VersionConflict` instead of
//! silently overwriting a concurrent mutation.

use super::record::WorkflowRecord;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("workflow '{id}' not found")]
    NotFound { id: String },

    #[error("version conflict on '{id}': expected {expected}, found {found}")]
    VersionConflict {
        id: String,
        expected: u64,
        found: u64,
    },
}

/// In-memory registry of workflow records
///
/// Deliberately an explicit handle rather than a global: tests and
/// multiple engine instances each get their own store.
#[derive(Debug, Default)]
pub struct WorkflowStore {
    records: Mutex<HashMap<String, WorkflowRecord>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new record and return a snapshot of it
    pub fn create(&self, goal: impl Into<String>, dataset_url: Option<String>) -> WorkflowRecord {
        let record = WorkflowRecord::new(goal, dataset_url);
        let snapshot = record.clone();

        let mut records = self.records.lock().expect("store lock poisoned");
        records.insert(record.id.clone(), record);

        snapshot
    }

    /// Snapshot of a record by id
    pub fn get(&self, id: &str) -> Result<WorkflowRecord, StoreError> {
        let records = self.records.lock().expect("store lock poisoned");
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.into() })
    }

    /// Apply a mutation to a record and return the updated snapshot
    ///
    /// When `expected_version` is supplied the write only happens if
    /// the stored record still carries that version; otherwise the
    /// caller lost a race and gets `VersionConflict`. Every successful
    /// mutation bumps `version` and refreshes `updated_at`.
    pub fn mutate<F>(
        &self,
        id: &str,
        expected_version: Option<u64>,
        f: F,
    ) -> Result<WorkflowRecord, StoreError>
    where
        F: FnOnce(&mut WorkflowRecord),
    {
        let mut records = self.records.lock().expect("store lock poisoned");
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.into() })?;

        if let Some(expected) = expected_version {
            if record.version != expected {
                return Err(StoreError::VersionConflict {
                    id: id.into(),
                    expected,
                    found: record.version,
                });
            }
        }

        f(record);
        record.version += 1;
        record.updated_at = Utc::now();

        Ok(record.clone())
    }

    /// Snapshots of all records (unordered)
    pub fn list(&self) -> Vec<WorkflowRecord> {
        let records = self.records.lock().expect("store lock poisoned");
        records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Administrative reset: drop every record
    pub fn reset_all(&self) {
        let mut records = self.records.lock().expect("store lock poisoned");
        records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::stage::Stage;

    #[test]
    fn test_create_and_get() {
        let store = WorkflowStore::new();
        let record = store.create("find penguins", None);

        let fetched = store.get(&record.id).unwrap();
        assert_eq!(fetched.goal, "find penguins");
        assert_eq!(fetched.version, 0);
    }

    #[test]
    fn test_get_unknown_id() {
        let store = WorkflowStore::new();
        assert_eq!(
            store.get("wf-missing"),
            Err(StoreError::NotFound {
                id: "wf-missing".into()
            })
        );
    }

    #[test]
    fn test_mutate_bumps_version() {
        let store = WorkflowStore::new();
        let record = store.create("goal", None);

        let updated = store
            .mutate(&record.id, None, |r| r.stage = Stage::DatasetValidation)
            .unwrap();

        assert_eq!(updated.version, 1);
        assert_eq!(updated.stage, Stage::DatasetValidation);
        assert!(updated.updated_at >= record.updated_at);
    }

    #[test]
    fn test_mutate_with_matching_expected_version() {
        let store = WorkflowStore::new();
        let record = store.create("goal", None);

        let updated = store
            .mutate(&record.id, Some(0), |r| r.execution_attempts = 1)
            .unwrap();
        assert_eq!(updated.version, 1);
    }

    #[test]
    fn test_mutate_version_conflict() {
        let store = WorkflowStore::new();
        let record = store.create("goal", None);

        // Another writer gets there first
        store.mutate(&record.id, None, |_| {}).unwrap();

        let result = store.mutate(&record.id, Some(record.version), |r| {
            r.execution_attempts = 99
        });
        assert_eq!(
            result,
            Err(StoreError::VersionConflict {
                id: record.id.clone(),
                expected: 0,
                found: 1,
            })
        );

        // Loser's closure never ran
        assert_eq!(store.get(&record.id).unwrap().execution_attempts, 0);
    }

    #[test]
    fn test_concurrent_mutations_exactly_one_winner() {
        use std::sync::Arc;

        let store = Arc::new(WorkflowStore::new());
        let record = store.create("goal", None);
        let expected = record.version;

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = record.id.clone();
                std::thread::spawn(move || {
                    store.mutate(&id, Some(expected), |r| r.execution_attempts = i)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        let losers = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::VersionConflict { .. })))
            .count();

        assert_eq!(winners, 1);
        assert_eq!(losers, 1);
        assert_eq!(store.get(&record.id).unwrap().version, expected + 1);
    }

    #[test]
    fn test_reset_all() {
        let store = WorkflowStore::new();
        let a = store.create("a", None);
        let b = store.create("b", None);
        assert_eq!(store.len(), 2);

        store.reset_all();

        assert!(store.is_empty());
        assert!(matches!(store.get(&a.id), Err(StoreError::NotFound { .. })));
        assert!(matches!(store.get(&b.id), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_list() {
        let store = WorkflowStore::new();
        store.create("a", None);
        store.create("b", None);

        let mut goals: Vec<_> = store.list().into_iter().map(|r| r.goal).collect();
        goals.sort();
        assert_eq!(goals, vec!["a", "b"]);
    }
}
