//! Core types for remote shell session management.
//!
//! This crate provides the leaf building blocks:
//! - `ShellError` / `ReplyCode` - Reply taxonomy for every provider call
//! - `StreamFrame`, `ReceiveReply`, `CommandStateKind` - Wire data
//! - `codec` - Base64 and chunked block compression of stream payloads
//! - `Backend` - Contract with the process backend
//! - `ProviderConfig` - Provider tunables

pub mod codec;
pub mod config;
pub mod error;
pub mod ids;
pub mod traits;
pub mod wire;

pub use config::ProviderConfig;
pub use error::{CodecError, ReplyCode, ShellError, ShellResult};
pub use ids::{CommandId, IdGenerator, ShellId};
pub use traits::{Backend, BackendHandle, CommandOutput, CommandTarget, RequestTarget, StartCommand};
pub use wire::{
    CommandLine, CommandState, CommandStateKind, OutboundStreams, ReceiveReply, ShellSummary,
    StreamFrame,
};
