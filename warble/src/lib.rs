//! Warble, a small social network expressed entirely as key-value operations.
//!
//! - [`payload`] is the opaque byte envelope requests and replies travel in.
//! - [`api`] defines the request and reply records plus the stored
//!   [`WarbleRecord`].
//! - [`list`] is the codec for the append-only id and name lists kept under
//!   user, thread and hashtag keys.
//! - [`hashtag`] finds the `#tags` in a warble's text.
//! - [`keys`] builds every storage key the handlers touch.
//! - [`service`] holds the [`Application`] capability and the
//!   [`WarbleService`] handlers that implement it.

pub mod api;
pub mod error;
pub mod hashtag;
pub mod keys;
pub mod list;
pub mod payload;
pub mod service;

pub use api::{Timestamp, WarbleRecord};
pub use error::WarbleError;
pub use list::IdList;
pub use payload::Payload;
pub use service::{Application, WarbleService};
