use serde::{Deserialize, Serialize};

/// Reserved username for the organizer when they participate as a player
/// (Random mode, test games). Pre-seeded into every lobby's banned set so
/// no real player can collide with it.
pub const ORGANIZER_USERNAME: &str = "Organizer";

/// Sentinel quiz id that triggers random-quiz assembly instead of a bank
/// lookup.
pub const RANDOM_QUIZ_ID: &str = "random";
pub const RANDOM_QUIZ_SIZE: usize = 5;
pub const RANDOM_QUIZ_DURATION_S: u32 = 20;

/// Seconds shown on the pre-game loading screen.
pub const LOADING_DURATION_S: u32 = 5;
/// Seconds between two questions.
pub const INTERMISSION_DURATION_S: u32 = 3;
/// QRL questions always get this long, regardless of the quiz's
/// configured per-question duration.
pub const QRL_DURATION_S: u32 = 60;

/// Score multiplier for the first player to confirm a correct QCM answer.
pub const BONUS_MULTIPLIER: f64 = 1.2;

/// Panic mode becomes available below these thresholds.
pub const PANIC_THRESHOLD_QCM_S: u32 = 10;
pub const PANIC_THRESHOLD_QRL_S: u32 = 20;
/// Accelerated tick delay while panic mode is active.
pub const PANIC_TICK_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "QCM")]
    Qcm,
    #[serde(rename = "QRL")]
    Qrl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub text: String,
    pub points: u32,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub last_modification: Option<String>,
}

impl Question {
    /// Indices of the choices marked correct.
    pub fn correct_choices(&self) -> Vec<usize> {
        self.choices
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_correct)
            .map(|(i, _)| i)
            .collect()
    }

    /// Validate the bank rules for a single question.
    pub fn validate(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("question text cannot be empty".to_string());
        }
        if self.points < 10 || self.points > 100 || self.points % 10 != 0 {
            return Err(format!(
                "points must be a multiple of 10 between 10 and 100 (got {})",
                self.points
            ));
        }
        match self.question_type {
            QuestionType::Qcm => {
                if self.choices.len() < 2 || self.choices.len() > 4 {
                    return Err(format!(
                        "QCM questions need 2 to 4 choices (got {})",
                        self.choices.len()
                    ));
                }
                if !self.choices.iter().any(|c| c.is_correct) {
                    return Err("QCM questions need at least one correct choice".to_string());
                }
                if self.choices.iter().all(|c| c.is_correct) {
                    return Err("QCM questions need at least one incorrect choice".to_string());
                }
            }
            QuestionType::Qrl => {
                if !self.choices.is_empty() {
                    return Err("QRL questions cannot have choices".to_string());
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Answer window in seconds for QCM questions.
    pub duration: u32,
    pub questions: Vec<Question>,
    /// Hidden quizzes stay in the bank but cannot seed a game.
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub last_modification: Option<String>,
}

impl Quiz {
    /// Validate the bank rules for a whole quiz.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("quiz title cannot be empty".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("quiz description cannot be empty".to_string());
        }
        if self.duration < 10 || self.duration > 60 {
            return Err(format!(
                "quiz duration must be between 10 and 60 seconds (got {})",
                self.duration
            ));
        }
        if self.questions.is_empty() {
            return Err("quiz needs at least one question".to_string());
        }
        for question in &self.questions {
            question
                .validate()
                .map_err(|e| format!("question \"{}\": {}", question.text, e))?;
        }
        Ok(())
    }
}

/// A question paired with its 0-based position in the quiz. Immutable
/// snapshot for the duration of the question.
#[derive(Debug, Clone)]
pub struct QuestionWithIndex {
    pub question: Question,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameState {
    Lobby,
    Loading,
    InGame,
    Correction,
    Intermission,
    Leaderboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameVariant {
    Normal,
    Random,
    Test,
}

impl GameVariant {
    /// Test games show the first question right away, with no loading
    /// countdown.
    pub fn skips_loading(self) -> bool {
        self == GameVariant::Test
    }

    /// Whether the session moves to the next question without an explicit
    /// organizer go-ahead.
    pub fn auto_advances(self) -> bool {
        self != GameVariant::Normal
    }

    /// Whether a QRL question pauses for manual organizer grading.
    pub fn grades_qrl(self) -> bool {
        self == GameVariant::Normal
    }

    /// Whether the organizer is folded into the player roster.
    pub fn organizer_plays(self) -> bool {
        self != GameVariant::Normal
    }
}

/// Why a user was removed from a game. Serialized verbatim in kick
/// notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Left,
    Banned,
    OrganizerLeft,
    NoPlayersLeft,
    GameStarted,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RemovalReason::Left => "left the game",
            RemovalReason::Banned => "banned by the organizer",
            RemovalReason::OrganizerLeft => "the organizer left",
            RemovalReason::NoPlayersLeft => "no players left",
            RemovalReason::GameStarted => "the game already started",
        };
        f.write_str(text)
    }
}

/// Per-question answer statistics: per-choice selection counts for QCM,
/// per-grade counts (full/half/zero) for QRL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerStats {
    pub question_index: usize,
    pub bar_counts: Vec<u32>,
}

/// Roster snapshot pushed to clients. Answer state is deliberately
/// absent; it never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    pub score: u32,
    pub bonus_count: u32,
}
