//! Func, a tiny function-as-a-service front end for Warble.
//!
//! - [`dispatcher`] keeps the event-type to function hook table and routes
//!   events to the [`Application`](warble::Application) handlers.
//! - [`message`] is the JSON line protocol spoken by [`server`] and
//!   [`client`]. Framing is shared with the key-value store.
//! - [`server`] accepts connections and answers hook, unhook and event
//!   requests.
//! - [`client`] is what front ends such as the `warble` command use.
//! - [`cli`] parses the command line of the `func` binary.

pub mod cli;
pub mod client;
pub mod dispatcher;
pub mod message;
pub mod server;

pub use client::{EventOutcome, FuncClient};
pub use dispatcher::{DispatchError, Dispatcher, EventType, Function};
pub use server::FuncServer;
