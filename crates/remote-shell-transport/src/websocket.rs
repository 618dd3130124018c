//! WebSocket transport for remote shell clients.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use remote_shell_core::{Backend, ShellError};
use remote_shell_session::ShellProvider;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::{
    dispatch::dispatch,
    protocol::{ClientRequest, ServerResponse},
};

/// WebSocket handler state.
pub struct WsState<B>
where
    B: Backend,
{
    pub provider: Arc<ShellProvider<B>>,
}

impl<B> WsState<B>
where
    B: Backend,
{
    #[must_use]
    pub const fn new(provider: Arc<ShellProvider<B>>) -> Self {
        Self { provider }
    }
}

impl<B> Clone for WsState<B>
where
    B: Backend,
{
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler<B>(
    ws: WebSocketUpgrade,
    State(state): State<WsState<B>>,
) -> impl IntoResponse
where
    B: Backend + 'static,
{
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket<B>(socket: WebSocket, state: WsState<B>)
where
    B: Backend + 'static,
{
    let (mut sender, mut receiver) = socket.split();

    // Responses from synchronous calls and deferred replies share this queue
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerResponse>();

    let send_task = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let json = match serde_json::to_string(&response) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize response: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    tracing::info!("shell client connected");

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let request: ClientRequest = match serde_json::from_str(&msg) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Invalid client request: {e}");
                let err = ShellError::InvalidParameter(format!("invalid request: {e}"));
                let _ = tx.send(ServerResponse::error(0, &err));
                continue;
            }
        };

        dispatch(&state.provider, request, &tx);
    }

    tracing::info!("shell client disconnected");

    // Deferred replies still in flight keep their sender clones; the writer
    // stops with the socket.
    send_task.abort();
}

/// Create WebSocket router.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(provider));
/// ```
#[must_use]
pub fn create_ws_router<B>(provider: Arc<ShellProvider<B>>) -> axum::Router
where
    B: Backend + 'static,
{
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler::<B>))
        .layer(TraceLayer::new_for_http())
        .with_state(WsState::new(provider))
}
