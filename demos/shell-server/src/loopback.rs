//! Loopback backend: accepts every shell and command and echoes input back
//! on the shell's first output stream.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use remote_shell_core::{BackendHandle, CommandOutput, CommandTarget, RequestTarget};
use remote_shell_session::{BackendRequest, ChannelBackend, ShellProvider};
use tokio::sync::mpsc;

/// Input that finishes the echoing command.
const EXIT_LINE: &str = "exit";

pub async fn run(
    provider: Arc<ShellProvider<ChannelBackend>>,
    mut requests: mpsc::UnboundedReceiver<BackendRequest>,
) {
    let handles = AtomicU64::new(1);
    let next_handle = || BackendHandle(handles.fetch_add(1, Ordering::Relaxed));

    while let Some(request) = requests.recv().await {
        match request {
            BackendRequest::OpenShell(summary) => {
                let target = RequestTarget::Shell(summary.id);
                if let Err(e) = provider.report_accepted(&target, next_handle()) {
                    tracing::warn!("Failed to accept shell: {e}");
                }
            }
            BackendRequest::CloseShell { shell_id, handle } => {
                tracing::debug!(%shell_id, ?handle, "shell closed");
            }
            BackendRequest::StartCommand(start) => {
                tracing::info!(
                    command = %start.command_line.command,
                    args = ?start.command_line.arguments,
                    "loopback command started"
                );
                let target = start.target.request_target();
                if let Err(e) = provider.report_accepted(&target, next_handle()) {
                    tracing::warn!("Failed to accept command: {e}");
                }
            }
            BackendRequest::SendInput { target, data, .. } => {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { echo(&provider, &target, data).await });
            }
            BackendRequest::RequestOutput(target) => {
                tracing::trace!(command_id = %target.command_id, "output requested");
            }
        }
    }
}

async fn echo(
    provider: &ShellProvider<ChannelBackend>,
    target: &CommandTarget,
    data: bytes::Bytes,
) {
    let stream = match provider.get_shell(&target.shell_id) {
        Ok(summary) => match summary.output_streams.get(0) {
            Some(name) => name.to_string(),
            None => return,
        },
        Err(_) => return,
    };

    let exiting = std::str::from_utf8(&data).is_ok_and(|text| text.trim() == EXIT_LINE);
    let mut output = CommandOutput::new(stream, data);
    if exiting {
        output = output.finished(0);
    }

    if let Err(e) = provider
        .deliver_output(&target.shell_id, &target.command_id, output)
        .await
    {
        tracing::debug!(command_id = %target.command_id, "Echo not delivered: {e}");
    }
}
