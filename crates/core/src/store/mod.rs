//! Durable key/value storage shared by the two views.
//!
//! Each view owns one registry key and may only read the other view's key.
//! The discovery mailbox is written by whichever view launches a process.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by a [`KeyValueStore`] backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access key '{key}': {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },

    #[error("Failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },

    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// String-valued durable storage, modelled on a browser's local storage.
///
/// Writers replace the whole value of a key; readers may observe any
/// previously written value but never a partially written one.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> StoreResult<Option<String>>;

    fn write(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removing an absent key is not an error.
    fn delete(&self, key: &str) -> StoreResult<()>;
}

/// Serializes `value` as JSON under `key`.
pub fn write_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> StoreResult<()> {
    let json = serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.write(key, &json)
}

/// Outcome of a tolerant JSON read.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot<T> {
    /// The key holds a value that decoded cleanly.
    Present(T),
    /// The key is not set.
    Missing,
    /// The key could not be read or decoded this time.
    Unreadable,
}

impl<T> Snapshot<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Snapshot::Present(value) => Some(value),
            Snapshot::Missing | Snapshot::Unreadable => None,
        }
    }
}

/// Reads and decodes `key`, never failing.
///
/// A concurrent writer in another process may leave the key in any state,
/// so decode and I/O failures are logged and reported as `Unreadable`.
pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Snapshot<T> {
    let raw = match store.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Snapshot::Missing,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read storage key");
            return Snapshot::Unreadable;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Snapshot::Present(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "ignoring undecodable storage value");
            Snapshot::Unreadable
        }
    }
}
