//! File storage backend
//!
//! One JSON file per key inside a directory. Writes go to a temporary file
//! first and are renamed into place, so readers never see a torn cart.

use std::{
    fmt::Write as _,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::sync::broadcast;
use tracing::debug;

use super::{ContextId, PersistenceError, StorageBackend, StorageEvent, StorageKey};

const EVENT_CAPACITY: usize = 64;

/// Directory-backed storage.
///
/// Change events are only delivered to handles cloned from the same
/// `FileStorage`; other processes sharing the directory see new content on
/// their next read.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    events: broadcast::Sender<StorageEvent>,
}

impl FileStorage {
    /// Store carts under `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();

        fs::create_dir_all(&dir)?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self { dir, events })
    }

    /// The storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &StorageKey) -> PathBuf {
        self.dir.join(file_name(key))
    }
}

impl StorageBackend for FileStorage {
    fn load(&self, key: &StorageKey) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(payload) => Ok(Some(payload)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn save(
        &self,
        key: &StorageKey,
        payload: &str,
        origin: ContextId,
    ) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        let staging = path.with_extension(format!("{origin}.tmp"));

        fs::write(&staging, payload)?;
        fs::rename(&staging, &path)?;

        let event = StorageEvent {
            key: key.clone(),
            origin,
            payload: Some(payload.to_string()),
        };

        if self.events.send(event).is_err() {
            debug!(%key, "no storage subscribers");
        }

        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

/// File name for `key`: ASCII alphanumerics and `-` are kept, every other
/// byte is written as `_xx`.
fn file_name(key: &StorageKey) -> String {
    let mut name = String::with_capacity(key.as_str().len().saturating_add(5));

    for byte in key.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            name.push(char::from(byte));
        } else {
            // Writing to a String cannot fail.
            write!(name, "_{byte:02x}").ok();
        }
    }

    name.push_str(".json");
    name
}
