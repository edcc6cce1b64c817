//! Backend Module
//!
//! The capability interface every physical store implements, plus the two
//! adapters shipped with the crate.
//!
//! ## Adapters
//! - [`MemoryBackend`]: ordered map behind a lock, atomic by holding the
//!   write lock for the whole diff
//! - [`RemoteBackend`]: RESP client, atomic through `MULTI`/`EXEC`
//!
//! The adapter is picked once, when the [`AtomicStore`](crate::AtomicStore)
//! is constructed.

mod memory;
mod remote;

pub use memory::MemoryBackend;
pub use remote::RemoteBackend;

use crate::diff::Diff;
use crate::error::Result;

/// Minimal operation set over opaque byte keys and values
pub trait Backend: Send + Sync {
    /// Current value of `key`, `None` when absent
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Unconditional upsert
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`; absent keys are not an error
    fn delete(&self, key: &[u8]) -> Result<()>;

    fn exists(&self, key: &[u8]) -> Result<bool>;

    /// Apply every entry of `diff` as one all-or-nothing operation.
    ///
    /// Entries are applied in the diff's iteration order. On error none of
    /// them may be visible.
    fn apply(&self, diff: &Diff) -> Result<()>;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        (**self).delete(key)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        (**self).exists(key)
    }

    fn apply(&self, diff: &Diff) -> Result<()> {
        (**self).apply(diff)
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        (**self).delete(key)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        (**self).exists(key)
    }

    fn apply(&self, diff: &Diff) -> Result<()> {
        (**self).apply(diff)
    }
}
