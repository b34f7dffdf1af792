//! Portico - Transport and Session Core for LSP-style Tooling Servers
//!
//! Turns a raw duplex byte stream into correlated JSON-RPC requests,
//! notifications and responses, tracks one session per connection, supports
//! cooperative cancellation of in-flight requests, and maintains an
//! incrementally-synchronized text document model per URI.

pub mod config;
pub mod document;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;

pub use error::{PorticoError, PorticoResult};
