use crate::scoring::Grade;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Organizer: create a lobby for a quiz (the sentinel id assembles a
    /// random quiz instead).
    CreateGame {
        quiz_id: String,
    },
    /// Organizer: solo practice run, no lobby phase.
    CreateTestGame {
        quiz_id: String,
    },
    /// Player: enter a lobby by its numeric code.
    JoinGame {
        game_id: u32,
    },
    /// Player: claim a username and take a roster slot.
    SetUsername {
        name: String,
    },
    // Organizer lobby controls
    ToggleLock,
    BanPlayer {
        name: String,
    },
    StartGame,
    // In-game player messages
    UpdateSelection {
        choices: Vec<usize>,
    },
    UpdateAnswer {
        text: String,
    },
    ConfirmAnswer,
    // Organizer session controls
    NextQuestion,
    FinishCorrection {
        grades: Vec<PlayerGrade>,
    },
    TogglePause,
    StartPanicMode,
    LeaveGame,
}

/// One manual QRL grade, assigned by the organizer during correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerGrade {
    pub name: String,
    pub grade: Grade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    GameCreated {
        game_id: u32,
        quiz_title: String,
    },
    /// Ack for a successful JoinGame; the roster slot comes later with
    /// SetUsername.
    Joined {
        game_id: u32,
        quiz_title: String,
    },
    UsernameAccepted {
        name: String,
    },
    RosterUpdate {
        players: Vec<PlayerInfo>,
    },
    LockToggled {
        locked: bool,
    },
    StateChanged {
        state: GameState,
    },
    TimerTick {
        remaining: u32,
    },
    /// Player view of the active question, without correct-answer flags.
    Question {
        question: PublicQuestion,
        index: usize,
        total: usize,
    },
    /// Full question, only for a non-playing organizer.
    OrganizerQuestion {
        question: Question,
        index: usize,
        total: usize,
    },
    /// Live per-choice tally during the answer window (organizer only).
    SelectionStats {
        stats: AnswerStats,
    },
    /// All per-question stats so far plus the standings; pushed when an
    /// answer window closes and replayed at leaderboard time.
    StatsHistory {
        stats: Vec<AnswerStats>,
        players: Vec<PlayerInfo>,
    },
    /// Points message after grading.
    CorrectionMessage {
        text: String,
    },
    /// Collected free-text answers for the organizer to grade.
    QrlAnswers {
        answers: Vec<QrlAnswer>,
    },
    PlayerLeft {
        name: String,
        reason: RemovalReason,
    },
    Kicked {
        reason: RemovalReason,
    },
    PanicAvailable,
    PanicModeStarted,
    PauseToggled {
        paused: bool,
    },
    /// Solo practice run finished; sent instead of the leaderboard
    /// broadcast.
    TestFinished,
    Error {
        code: String,
        msg: String,
    },
}

/// Choice as shown to players: text only, no spoilers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicChoice {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub text: String,
    pub points: u32,
    pub choices: Vec<PublicChoice>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            question_type: q.question_type,
            text: q.text.clone(),
            points: q.points,
            choices: q
                .choices
                .iter()
                .map(|c| PublicChoice {
                    text: c.text.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrlAnswer {
    pub name: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Choice, QuestionType};

    #[test]
    fn test_public_question_hides_correct_flags() {
        let question = Question {
            id: "q".to_string(),
            question_type: QuestionType::Qcm,
            text: "Pick one".to_string(),
            points: 10,
            choices: vec![
                Choice {
                    text: "yes".to_string(),
                    is_correct: true,
                },
                Choice {
                    text: "no".to_string(),
                    is_correct: false,
                },
            ],
            last_modification: None,
        };

        let public = PublicQuestion::from(&question);
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("is_correct"));
        assert_eq!(public.choices.len(), 2);
    }

    #[test]
    fn test_client_message_round_trip() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"t":"join_game","game_id":4217}"#).unwrap();
        match msg {
            ClientMessage::JoinGame { game_id } => assert_eq!(game_id, 4217),
            _ => panic!("expected JoinGame"),
        }
    }

    #[test]
    fn test_server_message_tagging() {
        let json = serde_json::to_string(&ServerMessage::TimerTick { remaining: 7 }).unwrap();
        assert!(json.contains(r#""t":"timer_tick""#));
    }
}
