//! Persistence pipeline: an ordered list of transforms between in-memory state
//! and one storage key. Writes run the transforms front to back, reads run them
//! back to front. Storage always holds JSON text.

pub mod seal;
pub mod storage;
pub mod whitelist;

pub use seal::Seal;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use whitelist::Whitelist;

use secrecy::SecretString;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Dotted paths of the auth state that may be persisted.
pub const AUTH_WHITELIST: [&str; 7] = [
    "is_authenticated",
    "user.id",
    "user.name",
    "user.email",
    "user.role",
    "user.is_verified",
    "user.last_login",
];

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("invalid blob: {0}")]
    Format(String),
}

/// One step of the pipeline. Both directions are pure.
pub trait Transform: Send + Sync {
    /// Applied on write.
    ///
    /// # Errors
    /// Returns an error if the value cannot be transformed.
    fn forward(&self, value: Value) -> Result<Value, PersistError>;

    /// Applied on read.
    ///
    /// # Errors
    /// Returns an error if the value cannot be transformed back.
    fn reverse(&self, value: Value) -> Result<Value, PersistError>;
}

pub struct PersistPipeline {
    storage: Arc<dyn Storage>,
    key: String,
    transforms: Vec<Arc<dyn Transform>>,
}

impl PersistPipeline {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, key: &str) -> Self {
        Self {
            storage,
            key: key.to_string(),
            transforms: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Whitelist of the auth snapshot, then encryption under `secret`.
    #[must_use]
    pub fn sealed(storage: Arc<dyn Storage>, key: &str, secret: &SecretString) -> Self {
        Self::new(storage, key)
            .with_transform(Arc::new(Whitelist::new(AUTH_WHITELIST)))
            .with_transform(Arc::new(Seal::new(secret)))
    }

    /// # Errors
    /// Returns the first transform error.
    pub fn forward(&self, value: Value) -> Result<Value, PersistError> {
        self.transforms
            .iter()
            .try_fold(value, |value, transform| transform.forward(value))
    }

    /// # Errors
    /// Returns the first transform error.
    pub fn reverse(&self, value: Value) -> Result<Value, PersistError> {
        self.transforms
            .iter()
            .rev()
            .try_fold(value, |value, transform| transform.reverse(value))
    }

    /// Filters, seals and stores `state`.
    ///
    /// # Errors
    /// Returns an error if a transform or the storage write fails.
    pub fn persist<T: Serialize>(&self, state: &T) -> Result<(), PersistError> {
        let value = self.forward(serde_json::to_value(state)?)?;
        self.storage.set(&self.key, &serde_json::to_string(&value)?)?;
        debug!(key = %self.key, "state persisted");
        Ok(())
    }

    /// Reads and reverses the stored value, if any.
    ///
    /// # Errors
    /// Returns an error if the stored value cannot be decoded.
    pub fn load(&self) -> Result<Option<Value>, PersistError> {
        let Some(raw) = self.storage.get(&self.key)? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&raw)?;
        self.reverse(value).map(Some)
    }

    /// Restores persisted state. Never fails: anything unreadable is discarded
    /// and the default state is returned.
    pub fn rehydrate<T: DeserializeOwned + Default>(&self) -> T {
        let restored = self.load().and_then(|value| {
            value
                .map(serde_json::from_value::<T>)
                .transpose()
                .map_err(PersistError::from)
        });

        match restored {
            Ok(Some(state)) => state,
            Ok(None) => T::default(),
            Err(err) => {
                warn!(key = %self.key, "Discarding unreadable persisted state: {err}");
                self.clear();
                T::default()
            }
        }
    }

    /// Removes the stored value, logging failures.
    pub fn clear(&self) {
        if let Err(err) = self.storage.remove(&self.key) {
            warn!(key = %self.key, "Failed to remove persisted state: {err}");
        }
    }
}
