//! Transport layer for remote shell clients.
//!
//! Provides:
//! - Wire protocol (JSON requests and responses)
//! - Request dispatch into a `ShellProvider`
//! - WebSocket transport (feature: websocket)

pub mod dispatch;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use dispatch::dispatch;
pub use protocol::{ClientCall, ClientRequest, ResponseBody, ServerResponse};
