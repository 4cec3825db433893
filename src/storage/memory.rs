//! In-memory storage backend

use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashMap;
use tokio::sync::broadcast;
use tracing::debug;

use super::{ContextId, PersistenceError, StorageBackend, StorageEvent, StorageKey};

const EVENT_CAPACITY: usize = 64;

/// Process-local storage shared by every clone.
///
/// Clones stand in for separate execution contexts of one host: a write
/// through one clone is visible to, and announced to, all of them.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    entries: Mutex<FxHashMap<StorageKey, String>>,
    events: broadcast::Sender<StorageEvent>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Create an empty, unbounded store.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an empty store holding at most `bytes` of payload in total.
    pub fn with_quota(bytes: usize) -> Self {
        Self::build(Some(bytes))
    }

    fn build(quota: Option<usize>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(FxHashMap::default()),
                events,
                quota,
            }),
        }
    }

    /// Store `payload` without announcing it, as a previous session would have.
    ///
    /// # Errors
    ///
    /// Returns an error if the store's lock is poisoned.
    pub fn seed(&self, key: &StorageKey, payload: impl Into<String>) -> Result<(), PersistenceError> {
        self.entries()?.insert(key.clone(), payload.into());

        Ok(())
    }

    /// Number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the store's lock is poisoned.
    pub fn len(&self) -> Result<usize, PersistenceError> {
        Ok(self.entries()?.len())
    }

    /// Whether nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store's lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, PersistenceError> {
        Ok(self.entries()?.is_empty())
    }

    fn entries(&self) -> Result<MutexGuard<'_, FxHashMap<StorageKey, String>>, PersistenceError> {
        self.inner
            .entries
            .lock()
            .map_err(|error| PersistenceError::Unavailable(error.to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn load(&self, key: &StorageKey) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn save(
        &self,
        key: &StorageKey,
        payload: &str,
        origin: ContextId,
    ) -> Result<(), PersistenceError> {
        {
            let mut entries = self.entries()?;

            if let Some(limit) = self.inner.quota {
                let others: usize = entries
                    .iter()
                    .filter(|(stored, _)| *stored != key)
                    .map(|(_, value)| value.len())
                    .sum();
                let needed = others.saturating_add(payload.len());

                if needed > limit {
                    return Err(PersistenceError::QuotaExceeded {
                        key: key.clone(),
                        needed,
                        limit,
                    });
                }
            }

            entries.insert(key.clone(), payload.to_string());
        }

        let event = StorageEvent {
            key: key.clone(),
            origin,
            payload: Some(payload.to_string()),
        };

        if self.inner.events.send(event).is_err() {
            debug!(%key, "no storage subscribers");
        }

        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<StorageEvent> {
        self.inner.events.subscribe()
    }
}
