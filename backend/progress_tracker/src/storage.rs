//! # Storage
//!
//! Key/value persistence used by the progress store.
//!
//! The store only needs string keys and string values plus prefix scans, so
//! any backend that can offer those works. Two are provided:
//!
//! | Backend                    | Use                                   |
//! |----------------------------|---------------------------------------|
//! | [`MemoryStore`]            | tests and embedding in short-lived processes |
//! | [`crate::db::SqliteStore`] | the service binary                    |

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::errors::Result;

/// Minimal key/value backend.
///
/// Each method is a single logical operation; there are no multi-key
/// transactions.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    /// Delete a single key. Part of the backend contract for embedders;
    /// [`crate::ProgressStore`] never deletes a single record, it only
    /// overwrites records or clears them by prefix.
    fn remove(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// All keys starting with `prefix`, in ascending order.
    fn keys_with_prefix(&self, prefix: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Delete every key starting with `prefix`. Returns how many were removed.
    fn remove_prefix(&self, prefix: &str) -> impl Future<Output = Result<u64>> + Send;
}

impl<T: KeyValueStore> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> impl Future<Output = Result<Vec<String>>> + Send {
        (**self).keys_with_prefix(prefix)
    }

    fn remove_prefix(&self, prefix: &str) -> impl Future<Output = Result<u64>> + Send {
        (**self).remove_prefix(prefix)
    }
}

/// In-process backend over a `BTreeMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> T) -> T {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.with(|m| m.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with(|m| m.insert(key.to_string(), value.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.with(|m| m.remove(key));
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self.with(|m| {
            m.range(prefix.to_string()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, _)| k.clone())
                .collect()
        }))
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<u64> {
        Ok(self.with(|m| {
            let before = m.len();
            m.retain(|k, _| !k.starts_with(prefix));
            (before - m.len()) as u64
        }))
    }
}
