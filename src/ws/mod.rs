//! WebSocket connection layer.
//!
//! Each socket owns a `UserHandle` whose outbound queue is drained here;
//! game entities push to the handle, the socket task serializes. A
//! connection is anonymous until a create/join message binds it to a
//! game, and the binding routes the eventual disconnect.

pub mod handlers;
pub mod organizer;
pub mod player;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;

use crate::game::user::UserHandle;
use crate::manager::GameEntry;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::RemovalReason;

/// What a connection is, once it has created or joined a game.
#[derive(Debug, Clone)]
pub enum ConnRole {
    Organizer,
    Player { name: Option<String> },
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub game_id: u32,
    pub role: ConnRole,
}

/// Per-connection state threaded through the message handlers.
pub struct ConnectionCtx {
    pub user: UserHandle,
    pub binding: Option<Binding>,
}

impl ConnectionCtx {
    pub fn new(user: UserHandle) -> Self {
        Self {
            user,
            binding: None,
        }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (user, mut outbound) = UserHandle::new();
    tracing::info!("WebSocket connected: {}", user.id());
    let mut ctx = ConnectionCtx::new(user);

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                match queued {
                    Some(msg) => {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }

            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => {
                                if let Some(reply) =
                                    handlers::handle_message(msg, &mut ctx, &state).await
                                {
                                    if let Ok(json) = serde_json::to_string(&reply) {
                                        if sender.send(Message::Text(json.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!("failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("invalid message format: {}", e),
                                };
                                if let Ok(json) = serde_json::to_string(&error) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    handle_disconnect(&ctx, &state).await;
    tracing::info!("WebSocket closed: {}", ctx.user.id());
}

/// Route a dropped connection to the matching removal path. Duplicate
/// notifications are harmless; removal of an absent user is a no-op.
pub async fn handle_disconnect(ctx: &ConnectionCtx, state: &Arc<AppState>) {
    let Some(binding) = &ctx.binding else {
        return;
    };
    let Some(entry) = state.manager.get(binding.game_id).await else {
        return;
    };
    match (&binding.role, entry) {
        (ConnRole::Organizer, GameEntry::Lobby(lobby)) => lobby.remove_organizer().await,
        (ConnRole::Organizer, GameEntry::Session(session)) => session.remove_organizer().await,
        (ConnRole::Player { name: Some(name) }, GameEntry::Lobby(lobby)) => {
            lobby.remove_player(name, RemovalReason::Left).await;
        }
        (ConnRole::Player { name: Some(name) }, GameEntry::Session(session)) => {
            session.remove_player(name, RemovalReason::Left).await;
        }
        // Joined but never claimed a roster slot: nothing to clean up.
        (ConnRole::Player { name: None }, _) => {}
    }
}
