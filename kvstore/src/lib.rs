//! String key-value store served over TCP, with optional snapshot persistence.
//!
//! Each module focuses on a concrete responsibility:
//!
//! - [`snapshot`] encodes a whole map to disk and reads it back.
//! - [`store`] is the shared map every request handler works against. A single
//!   mutex covers the whole map and is held for exactly one map access.
//! - [`storage`] is the async capability trait application code is written
//!   against, implemented both in-process and by the remote client.
//! - [`message`] provides the JSON line protocol plus helpers for async reads
//!   and writes. The Func service reuses the same framing.
//! - [`server`] accepts connections, applies requests to the store, and flushes
//!   the snapshot when shut down.
//! - [`client`] is the storage adapter that talks to a remote [`server`].
//! - [`cli`] parses the command line of the `kvstore` binary.

pub mod cli;
pub mod client;
pub mod message;
pub mod server;
pub mod snapshot;
pub mod storage;
pub mod store;

pub use client::StoreClient;
pub use server::StoreServer;
pub use snapshot::{SnapshotError, StringMap};
pub use storage::{Storage, StorageError};
pub use store::ConcurrentStore;
