//! Dispatch of client requests into a shell provider.

use std::sync::Arc;

use remote_shell_core::{Backend, ShellError, ShellResult};
use remote_shell_session::{Pending, ShellProvider};
use tokio::sync::mpsc;

use crate::protocol::{ClientCall, ClientRequest, ResponseBody, ServerResponse};

/// Run one client request against `provider`, answering on `tx`.
///
/// Synchronous calls answer before this returns. Command and receive
/// requests answer from a spawned task once their deferred reply resolves.
pub fn dispatch<B>(
    provider: &Arc<ShellProvider<B>>,
    request: ClientRequest,
    tx: &mpsc::UnboundedSender<ServerResponse>,
) where
    B: Backend + 'static,
{
    let ClientRequest { request_id, call } = request;
    tracing::debug!(request_id, call = call.name(), "dispatching request");

    let result = match call {
        ClientCall::CreateShell {
            output_streams,
            compressed,
        } => provider
            .create_shell(&output_streams, compressed)
            .map(|shell_id| Some(ResponseBody::ShellCreated { shell_id })),
        ClientCall::DeleteShell { shell_id } => provider.delete_shell(&shell_id).map(|()| None),
        ClientCall::GetShell { shell_id } => provider
            .get_shell(&shell_id)
            .map(|summary| Some(ResponseBody::Shell(summary))),
        ClientCall::EnumerateShells => provider
            .enumerate_shells(|summary| {
                tx.send(ServerResponse::ok(request_id, ResponseBody::Shell(summary)))
                    .map_err(|_| ShellError::Failed("client disconnected".to_string()))
            })
            .map(|count| Some(ResponseBody::Enumerated { count })),
        ClientCall::ModifyShell { shell_id } => provider.modify_shell(&shell_id).map(|()| None),
        ClientCall::Connect { shell_id } => provider.invoke_connect(&shell_id).map(|()| None),
        ClientCall::Command {
            shell_id,
            command_line,
        } => match provider.invoke_command(&shell_id, command_line) {
            Ok(pending) => {
                answer_later(request_id, pending, tx, |command_id| {
                    ResponseBody::CommandStarted { command_id }
                });
                return;
            }
            Err(err) => Err(err),
        },
        ClientCall::Send { shell_id, frame } => provider.invoke_send(&shell_id, &frame).map(|()| None),
        ClientCall::Receive {
            shell_id,
            command_id,
        } => match provider.invoke_receive(&shell_id, &command_id) {
            Ok(pending) => {
                answer_later(request_id, pending, tx, ResponseBody::Received);
                return;
            }
            Err(err) => Err(err),
        },
        ClientCall::Signal {
            shell_id,
            command_id,
        } => provider
            .invoke_signal(&shell_id, command_id.as_ref())
            .map(|()| None),
        ClientCall::Ping => Ok(Some(ResponseBody::Pong)),
    };

    respond(tx, request_id, result);
}

fn respond(
    tx: &mpsc::UnboundedSender<ServerResponse>,
    request_id: u64,
    result: ShellResult<Option<ResponseBody>>,
) {
    let response = match result {
        Ok(Some(body)) => ServerResponse::ok(request_id, body),
        Ok(None) => ServerResponse::done(request_id),
        Err(err) => {
            tracing::debug!(request_id, %err, "request failed");
            ServerResponse::error(request_id, &err)
        }
    };
    if tx.send(response).is_err() {
        tracing::debug!(request_id, "client gone before response");
    }
}

fn answer_later<T, F>(
    request_id: u64,
    pending: Pending<T>,
    tx: &mpsc::UnboundedSender<ServerResponse>,
    into_body: F,
) where
    T: Send + 'static,
    F: FnOnce(T) -> ResponseBody + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = pending.await.map(|value| Some(into_body(value)));
        respond(&tx, request_id, result);
    });
}
