use crate::protocol::ServerMessage;
use crate::types::PlayerInfo;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Handle to one connected user: a connection id plus the outbound
/// message queue drained by the socket task. Cloning shares the queue.
#[derive(Debug, Clone)]
pub struct UserHandle {
    id: String,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl UserHandle {
    /// Create a handle and the receiving end for the socket task.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ulid::Ulid::new().to_string(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a message for this user. A gone peer is not an error; the
    /// disconnect path cleans the roster up separately.
    pub fn emit(&self, msg: ServerMessage) {
        let _ = self.tx.send(msg);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerState {
    NoAnswer,
    Interacting,
    Confirmed,
}

/// A roster slot: identity, accumulated score, and the in-flight answer
/// for the active question.
#[derive(Debug, Clone)]
pub struct Player {
    pub handle: UserHandle,
    pub name: String,
    pub score: u32,
    pub bonus_count: u32,
    pub answer_state: AnswerState,
    /// Current QCM picks (choice indices).
    pub selection: Vec<usize>,
    /// Current QRL free-text answer.
    pub answer_text: String,
}

impl Player {
    pub fn new(handle: UserHandle, name: String) -> Self {
        Self {
            handle,
            name,
            score: 0,
            bonus_count: 0,
            answer_state: AnswerState::NoAnswer,
            selection: Vec::new(),
            answer_text: String::new(),
        }
    }

    /// Wipe the per-question answer state when a new question opens.
    pub fn reset_answer(&mut self) {
        self.answer_state = AnswerState::NoAnswer;
        self.selection.clear();
        self.answer_text.clear();
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            name: self.name.clone(),
            score: self.score,
            bonus_count: self.bonus_count,
        }
    }
}
