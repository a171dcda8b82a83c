//! In-memory progress tracking for uploads and processing
//!
//! Entries are a fast-path cache for polling; the record store stays the
//! source of truth. Nothing here is persisted across restarts.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::types::FileStatus;

/// Progress snapshot for one file
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ProgressEntry {
    pub progress: u8,
    pub status: FileStatus,
}

impl Default for ProgressEntry {
    fn default() -> Self {
        Self {
            progress: 0,
            status: FileStatus::Uploading,
        }
    }
}

/// Thread-safe id -> progress map behind a single lock
#[derive(Debug, Default)]
pub struct ProgressStore {
    entries: Mutex<HashMap<Uuid, ProgressEntry>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update an entry, creating it if absent. Progress is clamped to 0..=100.
    pub fn set(&self, id: Uuid, progress: Option<i32>, status: Option<FileStatus>) -> ProgressEntry {
        let mut entries = self.entries.lock();
        let entry = entries.entry(id).or_default();
        apply(entry, progress, status);
        *entry
    }

    /// Update an existing entry only. Returns `None` if the id is unknown,
    /// so a removed entry is never brought back.
    pub fn update(
        &self,
        id: Uuid,
        progress: Option<i32>,
        status: Option<FileStatus>,
    ) -> Option<ProgressEntry> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&id)?;
        apply(entry, progress, status);
        Some(*entry)
    }

    pub fn get(&self, id: Uuid) -> Option<ProgressEntry> {
        self.entries.lock().get(&id).copied()
    }

    pub fn remove(&self, id: Uuid) -> Option<ProgressEntry> {
        self.entries.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn apply(entry: &mut ProgressEntry, progress: Option<i32>, status: Option<FileStatus>) {
    if let Some(progress) = progress {
        entry.progress = progress.clamp(0, 100) as u8;
    }
    if let Some(status) = status {
        entry.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_set_creates_and_clamps() {
        let store = ProgressStore::new();
        let id = Uuid::new_v4();

        let entry = store.set(id, Some(150), Some(FileStatus::Processing));
        assert_eq!(entry.progress, 100);
        assert_eq!(entry.status, FileStatus::Processing);

        let entry = store.set(id, Some(-5), None);
        assert_eq!(entry.progress, 0);
        assert_eq!(entry.status, FileStatus::Processing);
    }

    #[test]
    fn test_status_only_keeps_progress() {
        let store = ProgressStore::new();
        let id = Uuid::new_v4();

        store.set(id, Some(75), Some(FileStatus::Processing));
        store.set(id, None, Some(FileStatus::Failed));

        let entry = store.get(id).unwrap();
        assert_eq!(entry.progress, 75);
        assert_eq!(entry.status, FileStatus::Failed);
    }

    #[test]
    fn test_update_does_not_recreate_removed_entry() {
        let store = ProgressStore::new();
        let id = Uuid::new_v4();

        store.set(id, Some(10), Some(FileStatus::Processing));
        assert!(store.remove(id).is_some());
        assert!(store.update(id, Some(25), Some(FileStatus::Processing)).is_none());
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_writers() {
        let store = Arc::new(ProgressStore::new());
        let shared = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let own = Uuid::new_v4();
                    for p in 0..=100 {
                        store.set(own, Some(p), Some(FileStatus::Processing));
                        store.set(shared, Some(p), None);
                        let seen = store.get(own).unwrap();
                        assert_eq!(seen.progress as i32, p);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 9);
        assert_eq!(store.get(shared).unwrap().progress, 100);
    }

    proptest! {
        #[test]
        fn prop_progress_always_in_range(values in proptest::collection::vec(any::<i32>(), 1..50)) {
            let store = ProgressStore::new();
            let id = Uuid::new_v4();
            for v in values {
                let entry = store.set(id, Some(v), None);
                prop_assert!(entry.progress <= 100);
                prop_assert_eq!(entry.progress as i32, v.clamp(0, 100));
            }
        }
    }
}
