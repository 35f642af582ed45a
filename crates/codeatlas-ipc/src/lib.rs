//! CodeAtlas IPC protocol and client/server.
//!
//! Protocol definitions and Unix socket client/server implementations
//! for communication with the CodeAtlas daemon.

mod client;
mod error;
mod protocol;
mod server;

pub use client::{IpcClient, Subscription};
pub use error::IpcError;
pub use protocol::*;
pub use server::{IpcServer, RequestHandler};
