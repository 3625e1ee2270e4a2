//! Organizer command handlers.

use crate::manager::GameEntry;
use crate::protocol::{PlayerGrade, ServerMessage};
use crate::state::AppState;
use std::sync::Arc;

use super::handlers::error;
use super::{Binding, ConnRole, ConnectionCtx};

/// Resolve the connection's game, requiring the organizer role.
async fn organizer_entry(ctx: &ConnectionCtx, state: &Arc<AppState>) -> Result<GameEntry, String> {
    let binding = ctx.binding.as_ref().ok_or("not in a game")?;
    if !matches!(binding.role, ConnRole::Organizer) {
        return Err("only the organizer can do that".to_string());
    }
    state
        .manager
        .get(binding.game_id)
        .await
        .ok_or_else(|| "game not found".to_string())
}

pub async fn handle_create_game(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
    quiz_id: String,
) -> Option<ServerMessage> {
    if ctx.binding.is_some() {
        return error("ALREADY_IN_GAME", "already bound to a game");
    }
    match state.manager.create_lobby(ctx.user.clone(), &quiz_id).await {
        Some(lobby) => {
            ctx.binding = Some(Binding {
                game_id: lobby.game_id(),
                role: ConnRole::Organizer,
            });
            Some(ServerMessage::GameCreated {
                game_id: lobby.game_id(),
                quiz_title: lobby.quiz().title.clone(),
            })
        }
        None => error("INVALID_QUIZ", "quiz not found"),
    }
}

pub async fn handle_create_test_game(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
    quiz_id: String,
) -> Option<ServerMessage> {
    if ctx.binding.is_some() {
        return error("ALREADY_IN_GAME", "already bound to a game");
    }
    match state
        .manager
        .create_test_game(ctx.user.clone(), &quiz_id)
        .await
    {
        Some(session) => {
            ctx.binding = Some(Binding {
                game_id: session.game_id(),
                role: ConnRole::Organizer,
            });
            Some(ServerMessage::GameCreated {
                game_id: session.game_id(),
                quiz_title: session.quiz().title.clone(),
            })
        }
        None => error("INVALID_QUIZ", "quiz not found"),
    }
}

pub async fn handle_toggle_lock(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match organizer_entry(ctx, state).await {
        Ok(GameEntry::Lobby(lobby)) => {
            lobby.toggle_lock().await;
            None
        }
        Ok(GameEntry::Session(_)) => error("GAME_STARTED", "the game already started"),
        Err(msg) => error("NOT_IN_GAME", msg),
    }
}

pub async fn handle_ban_player(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
    name: String,
) -> Option<ServerMessage> {
    match organizer_entry(ctx, state).await {
        Ok(GameEntry::Lobby(lobby)) => {
            // Banning an absent name is a quiet no-op, same as removal.
            lobby.ban_player(&name).await;
            None
        }
        Ok(GameEntry::Session(_)) => error("GAME_STARTED", "bans only apply in the lobby"),
        Err(msg) => error("NOT_IN_GAME", msg),
    }
}

pub async fn handle_start_game(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let binding = match &ctx.binding {
        Some(b) if matches!(b.role, ConnRole::Organizer) => b.clone(),
        Some(_) => return error("UNAUTHORIZED", "only the organizer can start the game"),
        None => return error("NOT_IN_GAME", "not in a game"),
    };
    match state.manager.start_game(binding.game_id).await {
        Ok(_) => None,
        Err(msg) => error("CANNOT_START", msg),
    }
}

pub async fn handle_next_question(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match organizer_entry(ctx, state).await {
        Ok(GameEntry::Session(session)) => {
            if session.continue_quiz().await {
                None
            } else {
                error("CANNOT_ADVANCE", "the current question is not done")
            }
        }
        Ok(GameEntry::Lobby(_)) => error("GAME_NOT_STARTED", "the game has not started"),
        Err(msg) => error("NOT_IN_GAME", msg),
    }
}

pub async fn handle_finish_correction(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
    grades: Vec<PlayerGrade>,
) -> Option<ServerMessage> {
    match organizer_entry(ctx, state).await {
        Ok(GameEntry::Session(session)) => match session.finish_correction(grades).await {
            Ok(()) => None,
            Err(msg) => error("CORRECTION_FAILED", msg),
        },
        Ok(GameEntry::Lobby(_)) => error("GAME_NOT_STARTED", "the game has not started"),
        Err(msg) => error("NOT_IN_GAME", msg),
    }
}

pub async fn handle_toggle_pause(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match organizer_entry(ctx, state).await {
        Ok(GameEntry::Session(session)) => match session.toggle_pause().await {
            Some(_) => None,
            None => error("NO_ACTIVE_QUESTION", "nothing to pause"),
        },
        Ok(GameEntry::Lobby(_)) => error("GAME_NOT_STARTED", "the game has not started"),
        Err(msg) => error("NOT_IN_GAME", msg),
    }
}

pub async fn handle_start_panic_mode(
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match organizer_entry(ctx, state).await {
        Ok(GameEntry::Session(session)) => {
            if session.start_panic_mode().await {
                None
            } else {
                error("PANIC_UNAVAILABLE", "panic mode is not available yet")
            }
        }
        Ok(GameEntry::Lobby(_)) => error("GAME_NOT_STARTED", "the game has not started"),
        Err(msg) => error("NOT_IN_GAME", msg),
    }
}
