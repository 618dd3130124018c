//! Deferred replies.
//!
//! A [`Responder`] is the captured half of a client request whose answer comes
//! later (a receive waiting for output, a command waiting for the backend). It
//! is consumed by [`Responder::reply`], so a request can be answered at most
//! once. The caller holds the matching [`Pending`] future.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use remote_shell_core::{ShellError, ShellResult};
use tokio::sync::oneshot;

/// Captured request awaiting exactly one reply.
#[derive(Debug)]
pub struct Responder<T> {
    tx: oneshot::Sender<ShellResult<T>>,
}

impl<T> Responder<T> {
    /// Create a responder and the future its reply resolves.
    #[must_use]
    pub fn channel() -> (Self, Pending<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, Pending { rx })
    }

    /// Post the reply. Returns `false` if the requester has gone away.
    pub fn reply(self, result: ShellResult<T>) -> bool {
        self.tx.send(result).is_ok()
    }

    /// Whether the requester is still waiting.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Future resolving to the reply of a deferred call.
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<ShellResult<T>>,
}

impl<T> Pending<T> {
    /// Take the reply if it has already been posted.
    pub fn try_reply(&mut self) -> Option<ShellResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(abandoned())),
        }
    }
}

fn abandoned() -> ShellError {
    ShellError::Failed("request released without a reply".to_string())
}

impl<T> Future for Pending<T> {
    type Output = ShellResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(abandoned())))
    }
}
