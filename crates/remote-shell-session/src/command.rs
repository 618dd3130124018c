//! Command session: one command running inside a shell.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use remote_shell_core::{
    BackendHandle, CommandId, OutboundStreams, ReceiveReply, ShellError, ShellId, ShellResult,
};
use tokio::sync::Notify;

use crate::reply::{Pending, Responder};

/// Lifecycle phase of a command.
///
/// A command is absent until invoked, `Starting` until the backend accepts
/// it, `Running` afterwards and `Done` once signalled or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    Starting,
    Running,
    Done,
}

struct Inner {
    phase: CommandPhase,
    /// Completion flag per outbound stream, in declaration order.
    completed: Vec<bool>,
    /// The pending-receive slot.
    receive: Option<Responder<ReceiveReply>>,
    /// The deferred reply to the command invocation itself.
    start: Option<Responder<CommandId>>,
    handle: Option<BackendHandle>,
}

/// Requests still owed a reply when a command is closed.
#[derive(Debug)]
pub struct Closed {
    pub receive: Option<Responder<ReceiveReply>>,
    pub start: Option<Responder<CommandId>>,
    /// Name of the first declared stream, if it was not completed.
    pub first_stream_open: Option<String>,
}

/// One command inside a shell.
///
/// All mutable state sits behind a single per-command lock, so exactly one of
/// send, delivery or signal can claim a populated receive slot.
pub struct CommandSession {
    id: CommandId,
    shell_id: ShellId,
    streams: Arc<OutboundStreams>,
    inner: Mutex<Inner>,
    slot_changed: Notify,
}

impl std::fmt::Debug for CommandSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSession")
            .field("id", &self.id)
            .field("shell_id", &self.shell_id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl CommandSession {
    pub(crate) fn new(
        id: CommandId,
        shell_id: ShellId,
        streams: Arc<OutboundStreams>,
        start: Responder<CommandId>,
    ) -> Self {
        let completed = vec![false; streams.len()];
        Self {
            id,
            shell_id,
            streams,
            inner: Mutex::new(Inner {
                phase: CommandPhase::Starting,
                completed,
                receive: None,
                start: Some(start),
                handle: None,
            }),
            slot_changed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn id(&self) -> &CommandId {
        &self.id
    }

    /// Identifier of the owning shell.
    #[must_use]
    pub const fn shell_id(&self) -> &ShellId {
        &self.shell_id
    }

    #[must_use]
    pub fn phase(&self) -> CommandPhase {
        self.lock().phase
    }

    #[must_use]
    pub fn handle(&self) -> Option<BackendHandle> {
        self.lock().handle
    }

    /// Whether the outbound stream `name` has been marked complete.
    #[must_use]
    pub fn is_completed(&self, name: &str) -> bool {
        self.streams
            .position(name)
            .is_some_and(|i| self.lock().completed[i])
    }

    /// Mark the outbound stream `name` complete. No-op for unknown names.
    pub fn mark_completed(&self, name: &str) {
        if let Some(i) = self.streams.position(name) {
            self.lock().completed[i] = true;
        }
    }

    /// Whether a receive request is parked in the slot.
    #[must_use]
    pub fn has_pending_receive(&self) -> bool {
        self.lock().receive.is_some()
    }

    /// Park a receive request in the slot.
    ///
    /// # Errors
    /// `AlreadyExists` if the slot is occupied, `NotFound` if the command has
    /// already finished.
    pub fn park_receive(&self) -> ShellResult<Pending<ReceiveReply>> {
        let mut inner = self.lock();
        if inner.phase == CommandPhase::Done {
            return Err(ShellError::NotFound(format!("command {} has finished", self.id)));
        }
        if inner.receive.is_some() {
            return Err(ShellError::AlreadyExists(format!(
                "receive already pending on command {}",
                self.id
            )));
        }
        let (responder, pending) = Responder::channel();
        inner.receive = Some(responder);
        drop(inner);

        self.slot_changed.notify_waiters();
        Ok(pending)
    }

    /// Take ownership of the parked receive request, leaving the slot empty.
    pub fn take_receive(&self) -> Option<Responder<ReceiveReply>> {
        self.lock().receive.take()
    }

    /// Move from `Starting` to `Running`, returning the deferred start reply.
    ///
    /// # Errors
    /// `AlreadyExists` if the command was already accepted, `NotFound` if it
    /// has finished.
    pub fn accept(&self, handle: BackendHandle) -> ShellResult<Option<Responder<CommandId>>> {
        let mut inner = self.lock();
        match inner.phase {
            CommandPhase::Starting => {
                inner.phase = CommandPhase::Running;
                inner.handle = Some(handle);
                Ok(inner.start.take())
            }
            CommandPhase::Running => Err(ShellError::AlreadyExists(format!(
                "command {} already accepted",
                self.id
            ))),
            CommandPhase::Done => Err(ShellError::NotFound(format!(
                "command {} has finished",
                self.id
            ))),
        }
    }

    /// Finish the command and hand back every request still owed a reply.
    ///
    /// Wakes any delivery waiting on the slot; it observes `Done` and gives up.
    pub fn close(&self) -> Closed {
        let mut inner = self.lock();
        inner.phase = CommandPhase::Done;
        let first_stream_open = match inner.completed.first() {
            Some(&false) => self.streams.get(0).map(str::to_string),
            _ => None,
        };
        let closed = Closed {
            receive: inner.receive.take(),
            start: inner.start.take(),
            first_stream_open,
        };
        drop(inner);

        self.slot_changed.notify_waiters();
        closed
    }

    /// Claim the receive slot, or learn that the command finished.
    ///
    /// Returns `Ok(None)` while the slot is empty and the command is live.
    pub(crate) fn try_claim(&self) -> ShellResult<Option<Responder<ReceiveReply>>> {
        let mut inner = self.lock();
        if let Some(responder) = inner.receive.take() {
            return Ok(Some(responder));
        }
        if inner.phase == CommandPhase::Done {
            return Err(ShellError::NotFound(format!(
                "command {} finished before output could be delivered",
                self.id
            )));
        }
        Ok(None)
    }

    pub(crate) const fn slot_changed(&self) -> &Notify {
        &self.slot_changed
    }
}
