//! Rendezvous between backend output deliveries and client receive requests.
//!
//! Output may arrive before or after the client parks a receive request. A
//! delivery waits on the command's slot notification until it can claim the
//! request, the command finishes, or the optional timeout elapses.

use std::time::Duration;

use remote_shell_core::{ReceiveReply, ShellError, ShellResult};

use crate::{command::CommandSession, reply::Responder};

/// Wait until `command` has a parked receive request and claim it.
///
/// # Errors
/// `NotFound` if the command finishes first, `Failed` on timeout.
pub async fn claim_receive(
    command: &CommandSession,
    timeout: Option<Duration>,
) -> ShellResult<Responder<ReceiveReply>> {
    let wait = async {
        loop {
            let notified = command.slot_changed().notified();
            tokio::pin!(notified);
            // Register before checking so a wake between the check and the
            // await is not lost.
            notified.as_mut().enable();

            match command.try_claim() {
                Ok(Some(responder)) => return Ok(responder),
                Ok(None) => {}
                Err(err) => return Err(err),
            }
            notified.await;
        }
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, wait).await.unwrap_or_else(|_| {
            Err(ShellError::Failed(format!(
                "no receive request for command {} within {}ms",
                command.id(),
                limit.as_millis()
            )))
        }),
        None => wait.await,
    }
}
