use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::store::KeyValueStore;
use crate::error::StorageError;
use crate::models::action::PendingAction;

/// FIFO of unsynced field actions, persisted as one JSON array under a fixed
/// key. Every mutation is written through before it returns.
pub struct ActionQueue {
    store: Arc<dyn KeyValueStore>,
    key: String,
    entries: Mutex<Vec<PendingAction>>,
}

impl ActionQueue {
    pub fn open(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let entries = load(store.as_ref(), &key);
        if !entries.is_empty() {
            info!(pending = entries.len(), "restored pending actions");
        }

        Self {
            store,
            key,
            entries: Mutex::new(entries),
        }
    }

    /// Appends to the tail and persists; on a failed write the in-memory
    /// queue is left as it was.
    pub fn enqueue(&self, action: PendingAction) -> Result<usize, StorageError> {
        let mut entries = self.lock()?;
        entries.push(action);

        if let Err(err) = persist(self.store.as_ref(), &self.key, &entries) {
            entries.pop();
            return Err(err);
        }

        Ok(entries.len())
    }

    pub fn peek_head(&self) -> Option<PendingAction> {
        self.lock().ok()?.first().cloned()
    }

    /// Removes the current head, if any.
    pub fn remove_head(&self) -> Result<Option<PendingAction>, StorageError> {
        let mut entries = self.lock()?;
        if entries.is_empty() {
            return Ok(None);
        }
        let head = entries.remove(0);

        if let Err(err) = persist(self.store.as_ref(), &self.key, &entries) {
            entries.insert(0, head);
            return Err(err);
        }

        Ok(Some(head))
    }

    /// Removes the head only when it is still the action with `id`. A manual
    /// clear during an in-flight submission must not cost an unrelated entry.
    pub fn remove_head_if(&self, id: Uuid) -> Result<bool, StorageError> {
        let mut entries = self.lock()?;
        if entries.first().map(PendingAction::id) != Some(id) {
            return Ok(false);
        }
        let head = entries.remove(0);

        if let Err(err) = persist(self.store.as_ref(), &self.key, &entries) {
            entries.insert(0, head);
            return Err(err);
        }

        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.lock()
            .map(|entries| entries.iter().any(|action| action.id() == id))
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> Vec<PendingAction> {
        self.lock().map(|entries| entries.clone()).unwrap_or_default()
    }

    /// Reloads the full sequence from storage, replacing the in-memory copy.
    pub fn read_all(&self) -> Vec<PendingAction> {
        let loaded = load(self.store.as_ref(), &self.key);
        if let Ok(mut entries) = self.lock() {
            *entries = loaded.clone();
        }
        loaded
    }

    pub fn write_all(&self, actions: Vec<PendingAction>) -> Result<(), StorageError> {
        let mut entries = self.lock()?;
        persist(self.store.as_ref(), &self.key, &actions)?;
        *entries = actions;
        Ok(())
    }

    pub fn clear(&self) -> Result<usize, StorageError> {
        let mut entries = self.lock()?;
        persist(self.store.as_ref(), &self.key, &[])?;
        let dropped = entries.len();
        entries.clear();
        warn!(dropped, "pending action queue cleared");
        Ok(dropped)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<PendingAction>>, StorageError> {
        self.entries.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn persist(
    store: &dyn KeyValueStore,
    key: &str,
    entries: &[PendingAction],
) -> Result<(), StorageError> {
    let blob = serde_json::to_string(entries)?;
    store.set(key, &blob)
}

/// Missing or unreadable blobs yield an empty queue. A blob that fails to
/// parse is copied to `<key>.corrupt-<timestamp>` first so it can be
/// recovered by hand; earlier quarantined copies are never overwritten.
fn load(store: &dyn KeyValueStore, key: &str) -> Vec<PendingAction> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!(error = %err, key, "failed to read pending actions; starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<PendingAction>>(&raw) {
        Ok(entries) => entries,
        Err(err) => {
            let quarantine_key = quarantine_key_for(store, key);
            if let Err(write_err) = store.set(&quarantine_key, &raw) {
                warn!(error = %write_err, key = %quarantine_key, "failed to quarantine corrupt queue blob");
            }
            if let Err(write_err) = store.set(key, "[]") {
                warn!(error = %write_err, key, "failed to reset corrupt queue blob");
            }
            warn!(error = %err, key, quarantine = %quarantine_key, "corrupt pending actions reset to empty queue");
            Vec::new()
        }
    }
}

fn quarantine_key_for(store: &dyn KeyValueStore, key: &str) -> String {
    let base = format!("{key}.corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"));
    let mut candidate = base.clone();
    let mut suffix = 1;
    while matches!(store.get(&candidate), Ok(Some(_))) {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    candidate
}
