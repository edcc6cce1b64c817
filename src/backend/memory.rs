//! In-memory backend
//!
//! BTreeMap wrapped in a parking_lot RwLock.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::diff::{Diff, DiffEntry};
use crate::error::Result;

use super::Backend;

/// Process-local key-value store
///
/// ## Concurrency:
/// - `data`: many concurrent readers, one exclusive writer
/// - `apply` holds the write lock for the whole diff, so no reader can
///   observe a partially applied batch
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-populated with `entries`
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let data = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            data: RwLock::new(data),
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Copy of every live key/value pair, sorted by key
    pub fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn apply(&self, diff: &Diff) -> Result<()> {
        let mut data = self.data.write();
        for (key, entry) in diff.iter() {
            match entry {
                DiffEntry::Set(value) => {
                    data.insert(key.to_vec(), value.clone());
                }
                DiffEntry::Delete => {
                    data.remove(key);
                }
            }
        }
        tracing::trace!("Applied {} diff entries in memory", diff.len());
        Ok(())
    }
}
