//! Backend collaborator contract.
//!
//! The provider never runs commands itself. It forwards lifecycle requests and
//! inbound data to a [`Backend`], which answers asynchronously through the
//! provider's `report_accepted`, `report_rejected` and `deliver_output` calls.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    ids::{CommandId, ShellId},
    wire::{CommandLine, CommandStateKind, ShellSummary},
};

/// Opaque handle a backend attaches to a shell or command it accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendHandle(pub u64);

/// Object a backend acceptance or rejection refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestTarget {
    Shell(ShellId),
    Command {
        shell_id: ShellId,
        command_id: CommandId,
    },
}

/// Addresses one command in calls to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTarget {
    pub shell_id: ShellId,
    pub command_id: CommandId,
    /// Set once the backend accepted the shell.
    pub shell_handle: Option<BackendHandle>,
    /// Set once the backend accepted the command.
    pub command_handle: Option<BackendHandle>,
}

impl CommandTarget {
    /// The acceptance target for this command.
    #[must_use]
    pub fn request_target(&self) -> RequestTarget {
        RequestTarget::Command {
            shell_id: self.shell_id.clone(),
            command_id: self.command_id.clone(),
        }
    }
}

/// Request to start a command.
#[derive(Debug, Clone)]
pub struct StartCommand {
    pub target: CommandTarget,
    pub command_line: CommandLine,
}

/// A chunk of output pushed by the backend.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stream: String,
    pub data: Bytes,
    /// State reported alongside the output; `None` means still running.
    pub state: Option<CommandStateKind>,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    #[must_use]
    pub fn new(stream: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            stream: stream.into(),
            data: data.into(),
            state: None,
            exit_code: None,
        }
    }

    /// Mark this output as the command's last, with its exit code.
    #[must_use]
    pub const fn finished(mut self, exit_code: i32) -> Self {
        self.state = Some(CommandStateKind::Done);
        self.exit_code = Some(exit_code);
        self
    }
}

/// Calls the provider issues to the process backend.
///
/// Every call is fire-and-forget from the provider's point of view and must
/// not block; results come back through the provider's callback methods.
pub trait Backend: Send + Sync {
    /// A shell was created. Accept it with
    /// `report_accepted(RequestTarget::Shell(..))` to attach a handle.
    fn open_shell(&self, shell: &ShellSummary) {
        let _ = shell;
    }

    /// A shell was deleted.
    fn close_shell(&self, shell_id: &ShellId, handle: Option<BackendHandle>) {
        let _ = (shell_id, handle);
    }

    /// Start a command. Must eventually be answered with `report_accepted` or
    /// `report_rejected` for `request.target`.
    fn start_command(&self, request: StartCommand);

    /// Forward decoded inbound bytes for `stream`.
    fn send_input(&self, target: &CommandTarget, stream: &str, data: Bytes);

    /// The client is waiting for more output.
    fn request_output(&self, target: &CommandTarget);
}
