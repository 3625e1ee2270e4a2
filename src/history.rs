//! Game history: one summary row per completed session.
//!
//! Entries are registered when a session starts and finalized with the
//! true best score when it ends, so the summary survives the game
//! object's teardown.

use crate::game::session::GameSession;
use crate::game::GameEvent;
use crate::store::{ElementStore, StoreError, StoredElement};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameHistoryEntry {
    pub id: String,
    pub game_name: String,
    pub start_date: String,
    pub players_nb: usize,
    pub best_score: u32,
}

impl StoredElement for GameHistoryEntry {
    fn element_id(&self) -> &str {
        &self.id
    }
}

pub struct GameHistoryService {
    store: Arc<dyn ElementStore<GameHistoryEntry>>,
    /// Entries for sessions still in progress, keyed by game id.
    pending: RwLock<HashMap<u32, GameHistoryEntry>>,
}

impl GameHistoryService {
    pub fn new(store: Arc<dyn ElementStore<GameHistoryEntry>>) -> Self {
        Self {
            store,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Open a pending entry at session start.
    pub async fn register(&self, game_id: u32, game_name: String, players_nb: usize) {
        let entry = GameHistoryEntry {
            id: ulid::Ulid::new().to_string(),
            game_name,
            start_date: chrono::Utc::now().to_rfc3339(),
            players_nb,
            best_score: 0,
        };
        self.pending.write().await.insert(game_id, entry);
    }

    /// Close the pending entry with the final best score and persist it.
    pub async fn finalize(&self, game_id: u32, best_score: u32) -> Result<(), StoreError> {
        let entry = self.pending.write().await.remove(&game_id);
        let Some(mut entry) = entry else {
            return Err(StoreError::NotFound(format!("game {game_id}")));
        };
        entry.best_score = best_score;
        tracing::info!(
            "game {} finished, best score {} ({} players)",
            game_id,
            best_score,
            entry.players_nb
        );
        self.store.add_element(entry).await
    }

    /// Drop the pending entry for a session that never finished.
    pub async fn discard(&self, game_id: u32) {
        if self.pending.write().await.remove(&game_id).is_some() {
            tracing::debug!("game {} discarded without a history entry", game_id);
        }
    }

    pub async fn entries(&self) -> Vec<GameHistoryEntry> {
        self.store.get_elements().await
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.delete_all_elements().await
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Register a session and spawn the recorder that reacts to its end.
    pub async fn attach(self: &Arc<Self>, session: &Arc<GameSession>) {
        let game_id = session.game_id();
        let players_nb = session.player_infos().await.len();
        self.register(game_id, session.quiz().title.clone(), players_nb)
            .await;

        let mut events = session.subscribe();
        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(GameEvent::QuizEnded { best_score }) => {
                        if let Err(e) = service.finalize(game_id, best_score).await {
                            tracing::error!("failed to persist history for game {game_id}: {e}");
                        }
                        return;
                    }
                    Ok(GameEvent::GameRemoved) => {
                        service.discard(game_id).await;
                        return;
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        service.discard(game_id).await;
                        return;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> Arc<GameHistoryService> {
        let store: Arc<MemoryStore<GameHistoryEntry>> = Arc::new(MemoryStore::new());
        Arc::new(GameHistoryService::new(store))
    }

    #[tokio::test]
    async fn test_register_then_finalize_persists_best_score() {
        let history = service();
        history.register(4217, "Systems".to_string(), 3).await;
        assert_eq!(history.pending_count().await, 1);

        history.finalize(4217, 120).await.unwrap();
        assert_eq!(history.pending_count().await, 0);

        let entries = history.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].game_name, "Systems");
        assert_eq!(entries[0].players_nb, 3);
        assert_eq!(entries[0].best_score, 120);
    }

    #[tokio::test]
    async fn test_finalize_unknown_game_fails() {
        let history = service();
        assert!(history.finalize(1234, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_discard_drops_pending_without_persisting() {
        let history = service();
        history.register(4217, "Systems".to_string(), 2).await;
        history.discard(4217).await;
        assert_eq!(history.pending_count().await, 0);
        assert!(history.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_wipes_persisted_entries() {
        let history = service();
        history.register(4217, "Systems".to_string(), 2).await;
        history.finalize(4217, 10).await.unwrap();
        history.clear().await.unwrap();
        assert!(history.entries().await.is_empty());
    }
}
