//! Player command handlers.
//!
//! The organizer also lands here in Random and Test games, where they
//! play under the reserved username.

use crate::manager::GameEntry;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::ORGANIZER_USERNAME;
use std::sync::Arc;

use super::handlers::error;
use super::{Binding, ConnRole, ConnectionCtx};

/// The roster name this connection answers under, if any.
fn answering_name(ctx: &ConnectionCtx) -> Option<String> {
    match &ctx.binding.as_ref()?.role {
        ConnRole::Organizer => Some(ORGANIZER_USERNAME.to_string()),
        ConnRole::Player { name } => name.clone(),
    }
}

async fn session_for(
    ctx: &ConnectionCtx,
    state: &Arc<AppState>,
) -> Result<Arc<crate::game::session::GameSession>, String> {
    let binding = ctx.binding.as_ref().ok_or("not in a game")?;
    match state.manager.get(binding.game_id).await {
        Some(GameEntry::Session(session)) => Ok(session),
        Some(GameEntry::Lobby(_)) => Err("the game has not started".to_string()),
        None => Err("game not found".to_string()),
    }
}

pub async fn handle_join_game(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
    game_id: u32,
) -> Option<ServerMessage> {
    if ctx.binding.is_some() {
        return error("ALREADY_IN_GAME", "already bound to a game");
    }
    match state.manager.get(game_id).await {
        None => error("GAME_NOT_FOUND", "game not found"),
        Some(GameEntry::Session(_)) => error("GAME_STARTED", "the game already started"),
        Some(GameEntry::Lobby(lobby)) => {
            if lobby.is_locked().await {
                return error("GAME_LOCKED", "the game is locked");
            }
            ctx.binding = Some(Binding {
                game_id,
                role: ConnRole::Player { name: None },
            });
            Some(ServerMessage::Joined {
                game_id,
                quiz_title: lobby.quiz().title.clone(),
            })
        }
    }
}

pub async fn handle_set_username(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
    name: String,
) -> Option<ServerMessage> {
    let binding = match &ctx.binding {
        Some(b) => b.clone(),
        None => return error("NOT_IN_GAME", "join a game first"),
    };
    match &binding.role {
        ConnRole::Player { name: None } => {}
        ConnRole::Player { name: Some(_) } => {
            return error("USERNAME_SET", "username already chosen")
        }
        ConnRole::Organizer => return error("UNAUTHORIZED", "the organizer has no username"),
    }
    match state.manager.get(binding.game_id).await {
        Some(GameEntry::Lobby(lobby)) => {
            match lobby.add_player(ctx.user.clone(), &name).await {
                Ok(accepted) => {
                    ctx.binding = Some(Binding {
                        game_id: binding.game_id,
                        role: ConnRole::Player {
                            name: Some(accepted.clone()),
                        },
                    });
                    Some(ServerMessage::UsernameAccepted { name: accepted })
                }
                Err(msg) => error("USERNAME_REJECTED", msg),
            }
        }
        Some(GameEntry::Session(_)) => error("GAME_STARTED", "the game already started"),
        None => error("GAME_NOT_FOUND", "game not found"),
    }
}

pub async fn handle_update_selection(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
    choices: Vec<usize>,
) -> Option<ServerMessage> {
    let Some(name) = answering_name(ctx) else {
        return error("NOT_IN_GAME", "no roster slot");
    };
    match session_for(ctx, state).await {
        Ok(session) => match session.update_selection(&name, choices).await {
            Ok(()) => None,
            Err(msg) => error("SELECTION_REJECTED", msg),
        },
        Err(msg) => error("NOT_IN_GAME", msg),
    }
}

pub async fn handle_update_answer(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
    text: String,
) -> Option<ServerMessage> {
    let Some(name) = answering_name(ctx) else {
        return error("NOT_IN_GAME", "no roster slot");
    };
    match session_for(ctx, state).await {
        Ok(session) => match session.update_answer(&name, text).await {
            Ok(()) => None,
            Err(msg) => error("ANSWER_REJECTED", msg),
        },
        Err(msg) => error("NOT_IN_GAME", msg),
    }
}

pub async fn handle_confirm_answer(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let Some(name) = answering_name(ctx) else {
        return error("NOT_IN_GAME", "no roster slot");
    };
    match session_for(ctx, state).await {
        Ok(session) => match session.confirm_answer(&name).await {
            Ok(()) => None,
            Err(msg) => error("CONFIRM_REJECTED", msg),
        },
        Err(msg) => error("NOT_IN_GAME", msg),
    }
}

/// Explicit leave: same routing as a dropped socket, then unbind.
pub async fn handle_leave_game(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    if ctx.binding.is_none() {
        return error("NOT_IN_GAME", "not in a game");
    }
    super::handle_disconnect(ctx, state).await;
    ctx.binding = None;
    None
}
