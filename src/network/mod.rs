//! Network Module
//!
//! A small RESP server over the crate's own backends, for local development
//! and as the peer of [`RemoteBackend`](crate::backend::RemoteBackend) in
//! tests.
//!
//! ## Architecture
//! - Single non-blocking acceptor loop
//! - One thread per connection
//! - MULTI/EXEC runs as a [`WriteBatch`](crate::WriteBatch) under an
//!   exclusive lock

mod server;
mod connection;

pub use server::{Server, ServerHandle, DEFAULT_DATABASES};
pub use connection::Connection;
