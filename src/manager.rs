//! Registry and factory for live games.
//!
//! Every live game sits in the id-keyed registry from creation to
//! teardown. Eviction is wired in exactly one place: each registration
//! subscribes to the game's event channel and drops the entry when
//! `GameRemoved` fires, so every variant's teardown path converges here.

use crate::game::lobby::GameLobby;
use crate::game::session::GameSession;
use crate::game::user::UserHandle;
use crate::game::{GameConfig, GameEvent};
use crate::history::GameHistoryService;
use crate::store::ElementStore;
use crate::types::*;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const GAME_ID_MIN: u32 = 1000;
const GAME_ID_MAX: u32 = 9999;

#[derive(Clone)]
pub enum GameEntry {
    Lobby(Arc<GameLobby>),
    Session(Arc<GameSession>),
}

pub struct GameManager {
    games: RwLock<HashMap<u32, GameEntry>>,
    quizzes: Arc<dyn ElementStore<Quiz>>,
    questions: Arc<dyn ElementStore<Question>>,
    history: Arc<GameHistoryService>,
}

impl GameManager {
    pub fn new(
        quizzes: Arc<dyn ElementStore<Quiz>>,
        questions: Arc<dyn ElementStore<Question>>,
        history: Arc<GameHistoryService>,
    ) -> Self {
        Self {
            games: RwLock::new(HashMap::new()),
            quizzes,
            questions,
            history,
        }
    }

    pub async fn get(&self, game_id: u32) -> Option<GameEntry> {
        self.games.read().await.get(&game_id).cloned()
    }

    pub async fn live_count(&self) -> usize {
        self.games.read().await.len()
    }

    /// Create a waiting room for a quiz. The sentinel quiz id assembles a
    /// random quiz and marks the lobby's future session as Random. A
    /// quiz that cannot be resolved yields no game; the caller surfaces
    /// that to the requester.
    pub async fn create_lobby(
        self: &Arc<Self>,
        organizer: UserHandle,
        quiz_id: &str,
    ) -> Option<Arc<GameLobby>> {
        let quiz = self.resolve_quiz(quiz_id).await?;
        let variant = if quiz_id == RANDOM_QUIZ_ID {
            GameVariant::Random
        } else {
            GameVariant::Normal
        };
        let game_id = self.generate_game_id().await;
        let lobby = GameLobby::new(GameConfig {
            organizer,
            game_id,
            quiz,
            variant,
        });
        self.games
            .write()
            .await
            .insert(game_id, GameEntry::Lobby(Arc::clone(&lobby)));
        self.watch_removal(game_id, lobby.subscribe());
        tracing::info!("created lobby {} for quiz {:?}", game_id, quiz_id);
        Some(lobby)
    }

    /// Solo practice run: a Test session built directly, no lobby phase,
    /// not recorded in history.
    pub async fn create_test_game(
        self: &Arc<Self>,
        organizer: UserHandle,
        quiz_id: &str,
    ) -> Option<Arc<GameSession>> {
        let quiz = self.resolve_quiz(quiz_id).await?;
        let game_id = self.generate_game_id().await;
        let session = GameSession::from_config(
            GameConfig {
                organizer,
                game_id,
                quiz,
                variant: GameVariant::Test,
            },
            Vec::new(),
        );
        self.games
            .write()
            .await
            .insert(game_id, GameEntry::Session(Arc::clone(&session)));
        self.watch_removal(game_id, session.subscribe());
        tracing::info!("created test game {} for quiz {:?}", game_id, quiz_id);
        session.set_up().await;
        Some(session)
    }

    /// Promote a lobby into a running session under the same game id.
    /// On failure the lobby stays registered and usable.
    pub async fn start_game(self: &Arc<Self>, game_id: u32) -> Result<Arc<GameSession>, String> {
        let entry = self.games.write().await.remove(&game_id);
        let lobby = match entry {
            Some(GameEntry::Lobby(lobby)) => lobby,
            Some(other) => {
                self.games.write().await.insert(game_id, other);
                return Err("the game already started".to_string());
            }
            None => return Err("game not found".to_string()),
        };

        match lobby.take_for_start().await {
            Ok((config, players)) => {
                let session = GameSession::from_config(config, players);
                self.games
                    .write()
                    .await
                    .insert(game_id, GameEntry::Session(Arc::clone(&session)));
                self.watch_removal(game_id, session.subscribe());
                self.history.attach(&session).await;
                session.set_up().await;
                Ok(session)
            }
            Err(e) => {
                self.games
                    .write()
                    .await
                    .insert(game_id, GameEntry::Lobby(lobby));
                Err(e)
            }
        }
    }

    async fn resolve_quiz(&self, quiz_id: &str) -> Option<Quiz> {
        if quiz_id == RANDOM_QUIZ_ID {
            return self.build_random_quiz().await;
        }
        let quiz = self.quizzes.get_element_by_id(quiz_id).await?;
        if quiz.hidden {
            tracing::warn!("refused to create a game from hidden quiz {:?}", quiz_id);
            return None;
        }
        Some(quiz)
    }

    /// Assemble a QCM-only quiz by sampling the question bank.
    async fn build_random_quiz(&self) -> Option<Quiz> {
        let bank: Vec<Question> = self
            .questions
            .get_elements()
            .await
            .into_iter()
            .filter(|q| q.question_type == QuestionType::Qcm)
            .collect();
        if bank.len() < RANDOM_QUIZ_SIZE {
            tracing::warn!(
                "not enough QCM questions in the bank for a random quiz ({}/{})",
                bank.len(),
                RANDOM_QUIZ_SIZE
            );
            return None;
        }
        let mut rng = rand::rng();
        let questions: Vec<Question> = bank
            .choose_multiple(&mut rng, RANDOM_QUIZ_SIZE)
            .cloned()
            .collect();
        Some(Quiz {
            id: RANDOM_QUIZ_ID.to_string(),
            title: "Random mode".to_string(),
            description: "Five questions drawn from the bank".to_string(),
            duration: RANDOM_QUIZ_DURATION_S,
            questions,
            hidden: false,
            last_modification: Some(chrono::Utc::now().to_rfc3339()),
        })
    }

    /// Rejection-sample a 4-digit id not currently in use.
    async fn generate_game_id(&self) -> u32 {
        let games = self.games.read().await;
        let mut rng = rand::rng();
        loop {
            let candidate = rng.random_range(GAME_ID_MIN..=GAME_ID_MAX);
            if !games.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Drop the registry entry when the game announces its removal.
    fn watch_removal(self: &Arc<Self>, game_id: u32, mut events: broadcast::Receiver<GameEvent>) {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(GameEvent::GameRemoved) => {
                        if let Some(manager) = manager.upgrade() {
                            manager.games.write().await.remove(&game_id);
                            tracing::debug!("game {} evicted from registry", game_id);
                        }
                        return;
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    // Sender gone without a removal event: the game was
                    // promoted (lobby) or dropped wholesale; nothing to
                    // evict here.
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn qcm_question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            question_type: QuestionType::Qcm,
            text: format!("question {id}"),
            points: 10,
            choices: vec![
                Choice {
                    text: "a".to_string(),
                    is_correct: true,
                },
                Choice {
                    text: "b".to_string(),
                    is_correct: false,
                },
            ],
            last_modification: None,
        }
    }

    fn quiz(id: &str) -> Quiz {
        Quiz {
            id: id.to_string(),
            title: format!("quiz {id}"),
            description: "d".to_string(),
            duration: 20,
            questions: vec![qcm_question("q1")],
            hidden: false,
            last_modification: None,
        }
    }

    fn manager_with(quizzes: Vec<Quiz>, questions: Vec<Question>) -> Arc<GameManager> {
        let store: Arc<MemoryStore<crate::history::GameHistoryEntry>> =
            Arc::new(MemoryStore::new());
        let history = Arc::new(GameHistoryService::new(store));
        Arc::new(GameManager::new(
            Arc::new(MemoryStore::with_elements(quizzes)),
            Arc::new(MemoryStore::with_elements(questions)),
            history,
        ))
    }

    fn organizer() -> UserHandle {
        UserHandle::new().0
    }

    #[tokio::test]
    async fn test_live_game_ids_are_unique() {
        let manager = manager_with(vec![quiz("a")], Vec::new());
        let mut seen = std::collections::HashSet::new();
        for _ in 0..40 {
            let lobby = manager.create_lobby(organizer(), "a").await.unwrap();
            assert!(
                (GAME_ID_MIN..=GAME_ID_MAX).contains(&lobby.game_id()),
                "game id out of range"
            );
            assert!(seen.insert(lobby.game_id()), "duplicate live game id");
        }
        assert_eq!(manager.live_count().await, 40);
    }

    #[tokio::test]
    async fn test_unknown_quiz_creates_no_game() {
        let manager = manager_with(vec![quiz("a")], Vec::new());
        assert!(manager.create_lobby(organizer(), "missing").await.is_none());
        assert!(manager
            .create_test_game(organizer(), "missing")
            .await
            .is_none());
        assert_eq!(manager.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_hidden_quiz_creates_no_game() {
        let mut hidden = quiz("a");
        hidden.hidden = true;
        let manager = manager_with(vec![hidden], Vec::new());
        assert!(manager.create_lobby(organizer(), "a").await.is_none());
    }

    #[tokio::test]
    async fn test_random_quiz_needs_enough_bank_questions() {
        let few = manager_with(Vec::new(), vec![qcm_question("q1"), qcm_question("q2")]);
        assert!(few.create_lobby(organizer(), RANDOM_QUIZ_ID).await.is_none());

        let enough = manager_with(
            Vec::new(),
            (0..6).map(|i| qcm_question(&format!("q{i}"))).collect(),
        );
        let lobby = enough
            .create_lobby(organizer(), RANDOM_QUIZ_ID)
            .await
            .unwrap();
        assert_eq!(lobby.variant(), GameVariant::Random);
        assert_eq!(lobby.quiz().questions.len(), RANDOM_QUIZ_SIZE);
        assert_eq!(lobby.quiz().duration, RANDOM_QUIZ_DURATION_S);
    }

    #[tokio::test]
    async fn test_random_quiz_only_samples_qcm() {
        let mut bank: Vec<Question> = (0..5).map(|i| qcm_question(&format!("q{i}"))).collect();
        bank.push(Question {
            id: "qrl".to_string(),
            question_type: QuestionType::Qrl,
            text: "explain".to_string(),
            points: 50,
            choices: Vec::new(),
            last_modification: None,
        });
        let manager = manager_with(Vec::new(), bank);
        let lobby = manager
            .create_lobby(organizer(), RANDOM_QUIZ_ID)
            .await
            .unwrap();
        assert!(lobby
            .quiz()
            .questions
            .iter()
            .all(|q| q.question_type == QuestionType::Qcm));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_game_promotes_lobby_under_same_id() {
        let manager = manager_with(vec![quiz("a")], Vec::new());
        let lobby = manager.create_lobby(organizer(), "a").await.unwrap();
        let game_id = lobby.game_id();
        lobby.add_player(organizer(), "ada").await.unwrap();
        lobby.toggle_lock().await;

        let session = manager.start_game(game_id).await.unwrap();
        assert_eq!(session.game_id(), game_id);
        assert_eq!(manager.live_count().await, 1);
        assert!(matches!(
            manager.get(game_id).await,
            Some(GameEntry::Session(_))
        ));
    }

    #[tokio::test]
    async fn test_start_unlocked_lobby_fails_and_keeps_it() {
        let manager = manager_with(vec![quiz("a")], Vec::new());
        let lobby = manager.create_lobby(organizer(), "a").await.unwrap();
        let game_id = lobby.game_id();

        assert!(manager.start_game(game_id).await.is_err());
        assert!(matches!(
            manager.get(game_id).await,
            Some(GameEntry::Lobby(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_evicts_registry_entry() {
        let manager = manager_with(vec![quiz("a")], Vec::new());
        let lobby = manager.create_lobby(organizer(), "a").await.unwrap();
        let game_id = lobby.game_id();

        lobby.remove_organizer().await;
        // Let the eviction watcher run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(manager.get(game_id).await.is_none());
        assert_eq!(manager.live_count().await, 0);
    }
}
