//! Session orchestration for remote shells.
//!
//! Provides:
//! - `ShellProvider` - Client-facing entry points and backend callbacks
//! - `ShellRegistry` - Live shells keyed by identifier
//! - Deferred replies (`Responder` / `Pending`) and the output rendezvous

pub mod backend;
pub mod command;
pub mod payload;
pub mod provider;
pub mod registry;
pub mod rendezvous;
pub mod reply;
pub mod shell;

pub use backend::{BackendRequest, ChannelBackend};
pub use command::{CommandPhase, CommandSession};
pub use payload::PayloadPipeline;
pub use provider::{SessionRef, ShellProvider};
pub use registry::ShellRegistry;
pub use reply::{Pending, Responder};
pub use shell::ShellSession;
