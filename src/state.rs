use crate::history::GameHistoryService;
use crate::manager::GameManager;
use crate::store::MemoryStore;
use crate::types::{Question, Quiz};
use std::sync::Arc;

/// Shared application state: the banks, the history service, and the
/// live-game registry. Everything is wired explicitly at construction.
#[derive(Clone)]
pub struct AppState {
    pub quizzes: Arc<MemoryStore<Quiz>>,
    pub questions: Arc<MemoryStore<Question>>,
    pub history: Arc<GameHistoryService>,
    pub manager: Arc<GameManager>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_banks(Vec::new(), Vec::new())
    }

    pub fn with_banks(quizzes: Vec<Quiz>, questions: Vec<Question>) -> Self {
        let quizzes = Arc::new(MemoryStore::with_elements(quizzes));
        let questions = Arc::new(MemoryStore::with_elements(questions));
        let history_store: Arc<MemoryStore<crate::history::GameHistoryEntry>> =
            Arc::new(MemoryStore::new());
        let history = Arc::new(GameHistoryService::new(history_store));
        let manager = Arc::new(GameManager::new(
            quizzes.clone(),
            questions.clone(),
            history.clone(),
        ));
        Self {
            quizzes,
            questions,
            history,
            manager,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
