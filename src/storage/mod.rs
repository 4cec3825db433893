//! Durable cart storage.
//!
//! A [`StorageBackend`] is scoped key/value storage shared by every
//! execution context (tab, window, process) of one host. [`Persistence`] is
//! the adapter the cart store talks to: it encodes the cart as a JSON array,
//! applies the configured [`PersistencePolicy`] to backend failures, and
//! turns backend change events into [`ExternalChange`]s for other contexts.

use std::fmt::{Display, Formatter, Result as FmtResult};

use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    cart::{CartLine, LineId, equivalence_key},
    uuids::TypedUuid,
};

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Marker for execution context ids.
#[derive(Debug)]
pub enum ExecutionContext {}

/// Identifies one execution context writing to shared storage.
pub type ContextId = TypedUuid<ExecutionContext>;

/// Identity-scoped key under which one cart is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Wrap a raw key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StorageKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// What to do when the backend fails to read or write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PersistencePolicy {
    /// Log the failure and carry on: reads come back empty, writes are dropped.
    #[default]
    Swallow,

    /// Return the failure to the caller.
    Surface,
}

/// Storage failures.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The backing storage could not be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The write would exceed the backend's capacity.
    #[error("storage quota exceeded writing {key} ({needed} bytes, limit {limit})")]
    QuotaExceeded {
        /// Key being written.
        key: StorageKey,

        /// Bytes the store would hold after the write.
        needed: usize,

        /// Capacity in bytes.
        limit: usize,
    },

    /// Filesystem error.
    #[error("storage i/o error")]
    Io(#[from] std::io::Error),

    /// The cart could not be serialized.
    #[error("failed to encode cart")]
    Encode(#[source] serde_json::Error),
}

/// Raw change notification published by a backend after every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Key that changed.
    pub key: StorageKey,

    /// Context that performed the write.
    pub origin: ContextId,

    /// New serialized value; `None` when the key was removed.
    pub payload: Option<String>,
}

/// Scoped key/value storage shared between execution contexts.
#[automock]
pub trait StorageBackend: Send + Sync {
    /// Read the raw payload stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage cannot be read.
    fn load(&self, key: &StorageKey) -> Result<Option<String>, PersistenceError>;

    /// Store `payload` under `key` and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage cannot be written.
    fn save(
        &self,
        key: &StorageKey,
        payload: &str,
        origin: ContextId,
    ) -> Result<(), PersistenceError>;

    /// Receive change events for every key.
    fn changes(&self) -> broadcast::Receiver<StorageEvent>;
}

/// Backend chosen at startup.
#[derive(Debug, Clone)]
pub enum ConfiguredBackend {
    /// Process-local storage.
    Memory(MemoryStorage),

    /// One file per key in a directory.
    File(FileStorage),
}

impl StorageBackend for ConfiguredBackend {
    fn load(&self, key: &StorageKey) -> Result<Option<String>, PersistenceError> {
        match self {
            Self::Memory(storage) => storage.load(key),
            Self::File(storage) => storage.load(key),
        }
    }

    fn save(
        &self,
        key: &StorageKey,
        payload: &str,
        origin: ContextId,
    ) -> Result<(), PersistenceError> {
        match self {
            Self::Memory(storage) => storage.save(key, payload, origin),
            Self::File(storage) => storage.save(key, payload, origin),
        }
    }

    fn changes(&self) -> broadcast::Receiver<StorageEvent> {
        match self {
            Self::Memory(storage) => storage.changes(),
            Self::File(storage) => storage.changes(),
        }
    }
}

/// A cart written by another execution context.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalChange {
    /// Key that changed.
    pub key: StorageKey,

    /// The cart now stored under that key.
    pub lines: Vec<CartLine>,
}

/// The durable store adapter used by one execution context.
#[derive(Debug)]
pub struct Persistence<B> {
    backend: B,
    policy: PersistencePolicy,
    context: ContextId,
}

impl<B: StorageBackend> Persistence<B> {
    /// Create an adapter for a new execution context.
    pub fn new(backend: B, policy: PersistencePolicy) -> Self {
        Self {
            backend,
            policy,
            context: ContextId::new(),
        }
    }

    /// This context's id.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// The failure policy in force.
    pub fn policy(&self) -> PersistencePolicy {
        self.policy
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read the cart stored under `key`.
    ///
    /// A missing key or an unparsable payload reads as an empty cart.
    ///
    /// # Errors
    ///
    /// Returns the backend failure only under [`PersistencePolicy::Surface`].
    pub fn read(&self, key: &StorageKey) -> Result<Vec<CartLine>, PersistenceError> {
        match self.backend.load(key) {
            Ok(Some(payload)) => Ok(decode_lines(key, &payload)),
            Ok(None) => Ok(Vec::new()),
            Err(error) => self.fail("read", key, error).map(|()| Vec::new()),
        }
    }

    /// Replace the cart stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns the encode or backend failure only under
    /// [`PersistencePolicy::Surface`].
    pub fn write(&self, key: &StorageKey, lines: &[CartLine]) -> Result<(), PersistenceError> {
        let result = serde_json::to_string(lines)
            .map_err(PersistenceError::Encode)
            .and_then(|payload| self.backend.save(key, &payload, self.context));

        match result {
            Ok(()) => {
                debug!(%key, lines = lines.len(), "cart persisted");
                Ok(())
            }
            Err(error) => self.fail("write", key, error),
        }
    }

    /// Subscribe to carts written by other execution contexts.
    pub fn subscribe(&self) -> ChangeSubscription {
        ChangeSubscription {
            receiver: self.backend.changes(),
            context: self.context,
        }
    }

    fn fail(
        &self,
        operation: &str,
        key: &StorageKey,
        error: PersistenceError,
    ) -> Result<(), PersistenceError> {
        match self.policy {
            PersistencePolicy::Swallow => {
                warn!(%key, operation, error = %error, "cart storage failure ignored");
                Ok(())
            }
            PersistencePolicy::Surface => Err(error),
        }
    }
}

/// Stream of [`ExternalChange`]s written by other contexts.
///
/// Writes made through the owning [`Persistence`] are filtered out.
#[derive(Debug)]
pub struct ChangeSubscription {
    receiver: broadcast::Receiver<StorageEvent>,
    context: ContextId,
}

impl ChangeSubscription {
    /// Wait for the next change from another context.
    ///
    /// Returns `None` once the backend has gone away.
    pub async fn recv(&mut self) -> Option<ExternalChange> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if let Some(change) = self.accept(event) {
                        return Some(change);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "cart change subscription lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next pending change without waiting.
    pub fn try_recv(&mut self) -> Option<ExternalChange> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if let Some(change) = self.accept(event) {
                        return Some(change);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "cart change subscription lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    fn accept(&self, event: StorageEvent) -> Option<ExternalChange> {
        if event.origin == self.context {
            return None;
        }

        let lines = event
            .payload
            .as_deref()
            .map(|payload| decode_lines(&event.key, payload))
            .unwrap_or_default();

        Some(ExternalChange {
            key: event.key,
            lines,
        })
    }
}

/// Decode a persisted cart.
///
/// Anything other than a JSON array reads as empty. Individual entries that
/// do not decode are dropped so one bad record cannot take the whole cart
/// with it. Entries stored without an id get one derived from the key, their
/// position and their equivalence key, so every reader of the same payload
/// sees the same ids.
pub fn decode_lines(key: &StorageKey, payload: &str) -> Vec<CartLine> {
    let entries = match serde_json::from_str::<Value>(payload) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            warn!(%key, "stored cart is not an array; treating as empty");
            return Vec::new();
        }
        Err(error) => {
            warn!(%key, error = %error, "stored cart is not valid JSON; treating as empty");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let missing_id = entry.get("id").is_none();

            match serde_json::from_value::<CartLine>(entry) {
                Ok(mut line) => {
                    if missing_id {
                        line.id = derived_line_id(key, index, &line);
                    }

                    Some(line)
                }
                Err(error) => {
                    warn!(%key, index, error = %error, "dropping unreadable cart line");
                    None
                }
            }
        })
        .collect()
}

fn derived_line_id(key: &StorageKey, index: usize, line: &CartLine) -> LineId {
    let name = format!("{key}\u{1f}{index}\u{1f}{}", equivalence_key(line).as_str());

    LineId::from_uuid(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
}
