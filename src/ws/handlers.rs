//! Message dispatch.
//!
//! Connection-state checks happen here; the per-role modules do the
//! actual work against the game entities.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use std::sync::Arc;

use super::{organizer, player, ConnectionCtx};

pub(crate) fn error(code: &str, msg: impl Into<String>) -> Option<ServerMessage> {
    Some(ServerMessage::Error {
        code: code.to_string(),
        msg: msg.into(),
    })
}

/// Handle one client message and return an optional direct reply.
/// Everything else (state changes, ticks, stats) reaches the client
/// through its user handle.
pub async fn handle_message(
    msg: ClientMessage,
    ctx: &mut ConnectionCtx,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::CreateGame { quiz_id } => {
            organizer::handle_create_game(ctx, state, quiz_id).await
        }
        ClientMessage::CreateTestGame { quiz_id } => {
            organizer::handle_create_test_game(ctx, state, quiz_id).await
        }
        ClientMessage::ToggleLock => organizer::handle_toggle_lock(ctx, state).await,
        ClientMessage::BanPlayer { name } => organizer::handle_ban_player(ctx, state, name).await,
        ClientMessage::StartGame => organizer::handle_start_game(ctx, state).await,
        ClientMessage::NextQuestion => organizer::handle_next_question(ctx, state).await,
        ClientMessage::FinishCorrection { grades } => {
            organizer::handle_finish_correction(ctx, state, grades).await
        }
        ClientMessage::TogglePause => organizer::handle_toggle_pause(ctx, state).await,
        ClientMessage::StartPanicMode => organizer::handle_start_panic_mode(ctx, state).await,

        ClientMessage::JoinGame { game_id } => player::handle_join_game(ctx, state, game_id).await,
        ClientMessage::SetUsername { name } => {
            player::handle_set_username(ctx, state, name).await
        }
        ClientMessage::UpdateSelection { choices } => {
            player::handle_update_selection(ctx, state, choices).await
        }
        ClientMessage::UpdateAnswer { text } => {
            player::handle_update_answer(ctx, state, text).await
        }
        ClientMessage::ConfirmAnswer => player::handle_confirm_answer(ctx, state).await,
        ClientMessage::LeaveGame => player::handle_leave_game(ctx, state).await,
    }
}
