//! Write Batch
//!
//! A batch stages mutations in a [`Diff`] and applies them to its backend in
//! one atomic step.
//!
//! ## Lifecycle
//! ```text
//!   begin_batch() ──► Open ──set/delete/get/exists──► Open
//!                      │
//!          commit() / abort() / drop
//!                      ▼
//!                   Closed (every call returns KvError::Usage)
//! ```
//! A batch closes exactly once. Closing releases both the diff and the
//! backend reference, whether or not the commit succeeded.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::Backend;
use crate::diff::{Diff, DiffEntry};
use crate::error::{KvError, Result};

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Scoped set of pending mutations bound to one backend
///
/// Reads see the batch's own writes first and fall through to the backend
/// for keys the batch never touched.
pub struct WriteBatch<'a, B: Backend + ?Sized> {
    /// Identifier used in log lines
    id: u64,

    /// `None` once the batch is closed
    state: Option<OpenBatch<'a, B>>,
}

struct OpenBatch<'a, B: ?Sized> {
    backend: &'a B,
    diff: Diff,
}

impl<'a, B: Backend + ?Sized> WriteBatch<'a, B> {
    pub(crate) fn new(backend: &'a B) -> Self {
        let id = NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Opened batch {}", id);
        Self {
            id,
            state: Some(OpenBatch {
                backend,
                diff: Diff::new(),
            }),
        }
    }

    /// Process-unique batch identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the batch still accepts operations
    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn open(&self, op: &str) -> Result<&OpenBatch<'a, B>> {
        self.state.as_ref().ok_or_else(|| KvError::closed_batch(op))
    }

    fn open_mut(&mut self, op: &str) -> Result<&mut OpenBatch<'a, B>> {
        self.state.as_mut().ok_or_else(|| KvError::closed_batch(op))
    }

    /// Value of `key` as this batch would leave it
    ///
    /// - pending set: the staged value
    /// - pending delete: `NotFound`
    /// - untouched: the backend's current value, or `NotFound`
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let open = self.open("get")?;
        match open.diff.get(key) {
            Some(DiffEntry::Set(value)) => Ok(value.clone()),
            Some(DiffEntry::Delete) => Err(KvError::NotFound),
            None => open.backend.get(key)?.ok_or(KvError::NotFound),
        }
    }

    /// Stage an upsert; the backend is not touched
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.open_mut("set")?.diff.set(key.to_vec(), value.to_vec());
        Ok(())
    }

    /// Stage a delete; succeeds even if the key is absent from the backend
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.open_mut("delete")?.diff.delete(key.to_vec());
        Ok(())
    }

    /// Presence of `key` as this batch would leave it
    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        let open = self.open("exists")?;
        match open.diff.get(key) {
            Some(DiffEntry::Set(_)) => Ok(true),
            Some(DiffEntry::Delete) => Ok(false),
            None => open.backend.exists(key),
        }
    }

    /// Number of distinct keys staged so far
    pub fn pending(&self) -> Result<usize> {
        Ok(self.open("pending")?.diff.len())
    }

    /// Apply the staged diff atomically and close the batch
    ///
    /// The batch is closed even when the backend rejects the commit; build a
    /// new batch to try again.
    pub fn commit(&mut self) -> Result<()> {
        let OpenBatch { backend, diff } = self
            .state
            .take()
            .ok_or_else(|| KvError::closed_batch("commit"))?;

        if diff.is_empty() {
            tracing::debug!("Batch {} closed with nothing to commit", self.id);
            return Ok(());
        }

        match backend.apply(&diff) {
            Ok(()) => {
                tracing::debug!("Batch {} committed {} entries", self.id, diff.len());
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Batch {} commit of {} entries failed: {}", self.id, diff.len(), e);
                Err(e)
            }
        }
    }

    /// Discard the staged diff and close the batch
    pub fn abort(&mut self) -> Result<()> {
        let open = self
            .state
            .take()
            .ok_or_else(|| KvError::closed_batch("abort"))?;
        tracing::debug!("Batch {} aborted, {} entries discarded", self.id, open.diff.len());
        Ok(())
    }

    /// Close without committing; a no-op on a closed batch
    pub(crate) fn discard(&mut self) {
        if let Some(open) = self.state.take() {
            tracing::debug!("Batch {} discarded, {} entries dropped", self.id, open.diff.len());
        }
    }
}

impl<B: Backend + ?Sized> Drop for WriteBatch<'_, B> {
    fn drop(&mut self) {
        self.discard();
    }
}

impl<B: Backend + ?Sized> std::fmt::Debug for WriteBatch<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBatch")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("pending", &self.state.as_ref().map(|s| s.diff.len()))
            .finish()
    }
}
