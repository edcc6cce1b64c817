//! Atomic Store
//!
//! Owns one backend, serves immediate reads and writes against it, and hands
//! out [`WriteBatch`]es bound to it.
//!
//! ## Isolation
//! Batches opened concurrently against one store are not isolated from each
//! other or from immediate writes. Each commit applies its diff as-is; if
//! two batches touch the same key, the later commit wins and no error is
//! raised. Callers that need more must coordinate outside the store.

use crate::backend::Backend;
use crate::batch::WriteBatch;
use crate::error::{KvError, Result};

/// Key-value store with atomic write batches
pub struct AtomicStore<B: Backend> {
    backend: B,
}

impl<B: Backend> AtomicStore<B> {
    /// Wrap `backend`; the store owns it for its whole lifetime
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    // =========================================================================
    // Immediate operations (bypass every batch)
    // =========================================================================

    /// Get a value by key, `NotFound` when absent
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.backend.get(key)?.ok_or(KvError::NotFound)
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.backend.set(key, value)
    }

    /// Delete a key; absent keys are not an error
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.backend.delete(key)
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        self.backend.exists(key)
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Open a new batch bound to this store's backend
    ///
    /// The caller decides when to `commit` or `abort`; dropping the batch
    /// without either discards it.
    pub fn begin_batch(&self) -> WriteBatch<'_, B> {
        WriteBatch::new(&self.backend)
    }

    /// Run `body` inside a batch scope
    ///
    /// - `body` returns `Ok`: the batch commits (unless `body` already
    ///   committed or aborted it) and a commit failure is returned
    /// - `body` returns `Err`: the diff is discarded untouched
    /// - `body` panics: the batch is discarded during unwinding
    ///
    /// In every case the batch is closed before this returns.
    pub fn atomic_batch<T, E, F>(&self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut WriteBatch<'_, B>) -> std::result::Result<T, E>,
        E: From<KvError>,
    {
        let mut batch = self.begin_batch();
        match body(&mut batch) {
            Ok(value) => {
                if batch.is_open() {
                    batch.commit()?;
                }
                Ok(value)
            }
            Err(e) => {
                batch.discard();
                Err(e)
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Release the backend
    pub fn into_backend(self) -> B {
        self.backend
    }
}

impl<B: Backend + std::fmt::Debug> std::fmt::Debug for AtomicStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicStore")
            .field("backend", &self.backend)
            .finish()
    }
}
