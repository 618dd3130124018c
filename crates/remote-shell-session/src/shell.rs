//! Shell session: a client-visible shell hosting at most one command.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use remote_shell_core::{
    BackendHandle, CommandId, CommandTarget, OutboundStreams, ShellError, ShellId, ShellResult,
    ShellSummary,
};

use crate::{command::CommandSession, reply::Responder};

/// One shell and its (at most one) active command.
pub struct ShellSession {
    id: ShellId,
    streams: Arc<OutboundStreams>,
    compressed: bool,
    handle: OnceLock<BackendHandle>,
    command: Mutex<Option<Arc<CommandSession>>>,
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("id", &self.id)
            .field("streams", &self.streams)
            .field("compressed", &self.compressed)
            .finish_non_exhaustive()
    }
}

impl ShellSession {
    pub(crate) fn new(id: ShellId, streams: OutboundStreams, compressed: bool) -> Self {
        Self {
            id,
            streams: Arc::new(streams),
            compressed,
            handle: OnceLock::new(),
            command: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<CommandSession>>> {
        self.command.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn id(&self) -> &ShellId {
        &self.id
    }

    /// Declared outbound stream names, in order.
    #[must_use]
    pub fn streams(&self) -> &OutboundStreams {
        &self.streams
    }

    #[must_use]
    pub const fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Backend handle, once the backend accepted the shell.
    #[must_use]
    pub fn handle(&self) -> Option<BackendHandle> {
        self.handle.get().copied()
    }

    /// Attach the backend handle.
    ///
    /// # Errors
    /// `AlreadyExists` if a handle was attached before.
    pub fn set_handle(&self, handle: BackendHandle) -> ShellResult<()> {
        self.handle
            .set(handle)
            .map_err(|_| ShellError::AlreadyExists(format!("shell {} already accepted", self.id)))
    }

    /// The active command, if any.
    #[must_use]
    pub fn command(&self) -> Option<Arc<CommandSession>> {
        self.slot().clone()
    }

    /// The active command, provided its id is `command_id`.
    ///
    /// # Errors
    /// `NotFound` if there is no active command or it has another id.
    pub fn command_matching(&self, command_id: &CommandId) -> ShellResult<Arc<CommandSession>> {
        self.slot()
            .as_ref()
            .filter(|cmd| cmd.id() == command_id)
            .cloned()
            .ok_or_else(|| {
                ShellError::NotFound(format!("command {command_id} on shell {}", self.id))
            })
    }

    /// Allocate a command and attach it, unless one is already active.
    ///
    /// # Errors
    /// `AlreadyExists` if the shell already hosts a command.
    pub(crate) fn begin_command(
        &self,
        command_id: CommandId,
        start: Responder<CommandId>,
    ) -> ShellResult<Arc<CommandSession>> {
        let mut slot = self.slot();
        if let Some(existing) = slot.as_ref() {
            return Err(ShellError::AlreadyExists(format!(
                "shell {} already runs command {}",
                self.id,
                existing.id()
            )));
        }
        let command = Arc::new(CommandSession::new(
            command_id,
            self.id.clone(),
            Arc::clone(&self.streams),
            start,
        ));
        *slot = Some(Arc::clone(&command));
        Ok(command)
    }

    /// Detach the active command. With `Some(id)` only a command with that id
    /// is detached.
    ///
    /// # Errors
    /// `NotFound` if there is no active command or the id does not match.
    pub fn detach_command(&self, command_id: Option<&CommandId>) -> ShellResult<Arc<CommandSession>> {
        let mut slot = self.slot();
        let matches = match (slot.as_ref(), command_id) {
            (Some(cmd), Some(id)) => cmd.id() == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            return Err(ShellError::NotFound(match command_id {
                Some(id) => format!("command {id} on shell {}", self.id),
                None => format!("no active command on shell {}", self.id),
            }));
        }
        slot.take()
            .ok_or_else(|| ShellError::NotFound(format!("no active command on shell {}", self.id)))
    }

    /// Backend address of `command` within this shell.
    #[must_use]
    pub fn target(&self, command: &CommandSession) -> CommandTarget {
        CommandTarget {
            shell_id: self.id.clone(),
            command_id: command.id().clone(),
            shell_handle: self.handle(),
            command_handle: command.handle(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> ShellSummary {
        ShellSummary {
            id: self.id.clone(),
            output_streams: (*self.streams).clone(),
            compressed: self.compressed,
            command_id: self.slot().as_ref().map(|cmd| cmd.id().clone()),
        }
    }
}
