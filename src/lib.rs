//! # atomickv
//!
//! Atomic write batches over a pluggable key-value backend:
//! - Stage several mutations in a batch with read-your-own-writes
//! - Apply them to the backend as one all-or-nothing operation
//! - Discard them untouched when the batch scope fails
//! - In-memory backend and a RESP (Redis protocol) backend
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       AtomicStore                           │
//! │        immediate get/set/delete/exists + begin_batch         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ WriteBatch  │─────────►│    Diff     │
//!   │ (scoped)    │ stages   │  (ordered)  │
//!   └──────┬──────┘          └─────────────┘
//!          │ commit = Backend::apply(diff)
//!          ▼
//!   ┌──────────────────────────────────────┐
//!   │            B: Backend                │
//!   │  MemoryBackend  │  RemoteBackend     │
//!   │  (RwLock map)   │  (MULTI ... EXEC)  │
//!   └──────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use atomickv::{AtomicStore, KvError, MemoryBackend};
//!
//! let store = AtomicStore::new(MemoryBackend::new());
//! store.atomic_batch(|batch| -> Result<(), KvError> {
//!     batch.set(b"1", b"A")?;
//!     batch.set(b"2", b"B")?;
//!     Ok(())
//! })?;
//! assert_eq!(store.get(b"1")?, b"A".to_vec());
//! # Ok::<(), KvError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod diff;
pub mod backend;
pub mod batch;
pub mod store;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{RemoteConfig, ServerConfig};
pub use diff::{Diff, DiffEntry};
pub use backend::{Backend, MemoryBackend, RemoteBackend};
pub use batch::WriteBatch;
pub use store::AtomicStore;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of atomickv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
