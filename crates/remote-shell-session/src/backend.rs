//! Channel-backed backend adapter.

use bytes::Bytes;
use remote_shell_core::{Backend, BackendHandle, CommandTarget, ShellId, ShellSummary, StartCommand};
use tokio::sync::mpsc;

/// A call the provider made into the backend.
#[derive(Debug, Clone)]
pub enum BackendRequest {
    OpenShell(ShellSummary),
    CloseShell {
        shell_id: ShellId,
        handle: Option<BackendHandle>,
    },
    StartCommand(StartCommand),
    SendInput {
        target: CommandTarget,
        stream: String,
        data: Bytes,
    },
    RequestOutput(CommandTarget),
}

/// Backend that queues every call on an unbounded channel.
///
/// The receiving side runs the real process machinery (or a test) and
/// answers through the provider's callbacks.
#[derive(Debug, Clone)]
pub struct ChannelBackend {
    tx: mpsc::UnboundedSender<BackendRequest>,
}

impl ChannelBackend {
    /// Create the backend and the receiver its requests arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BackendRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn push(&self, request: BackendRequest) {
        if self.tx.send(request).is_err() {
            tracing::warn!("backend request dropped: receiver closed");
        }
    }
}

impl Backend for ChannelBackend {
    fn open_shell(&self, shell: &ShellSummary) {
        self.push(BackendRequest::OpenShell(shell.clone()));
    }

    fn close_shell(&self, shell_id: &ShellId, handle: Option<BackendHandle>) {
        self.push(BackendRequest::CloseShell {
            shell_id: shell_id.clone(),
            handle,
        });
    }

    fn start_command(&self, request: StartCommand) {
        self.push(BackendRequest::StartCommand(request));
    }

    fn send_input(&self, target: &CommandTarget, stream: &str, data: Bytes) {
        self.push(BackendRequest::SendInput {
            target: target.clone(),
            stream: stream.to_string(),
            data,
        });
    }

    fn request_output(&self, target: &CommandTarget) {
        self.push(BackendRequest::RequestOutput(target.clone()));
    }
}
