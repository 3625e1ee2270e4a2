use crate::game::user::{Player, UserHandle};
use crate::game::{GameConfig, GameEvent, Roster, EVENT_CHANNEL_CAPACITY};
use crate::protocol::ServerMessage;
use crate::types::{GameVariant, PlayerInfo, Quiz, RemovalReason, ORGANIZER_USERNAME};
use std::collections::HashSet;
use tokio::sync::{broadcast, RwLock};

/// Pre-game waiting room. Players join under the numeric code while the
/// lobby is unlocked; the organizer locks it and starts, at which point
/// the manager freezes the roster into a session under the same id.
pub struct GameLobby {
    game_id: u32,
    quiz: Quiz,
    variant: GameVariant,
    events: broadcast::Sender<GameEvent>,
    inner: RwLock<LobbyInner>,
}

struct LobbyInner {
    organizer: Option<UserHandle>,
    roster: Roster,
    locked: bool,
    /// Lowercased names that can no longer join this lobby.
    banned: HashSet<String>,
    started: bool,
    removed: bool,
}

impl GameLobby {
    pub fn new(config: GameConfig) -> std::sync::Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        // The reserved organizer name is banned up front so no player can
        // collide with the synthetic Random-mode organizer identity.
        let mut banned = HashSet::new();
        banned.insert(ORGANIZER_USERNAME.to_lowercase());

        std::sync::Arc::new(Self {
            game_id: config.game_id,
            quiz: config.quiz,
            variant: config.variant,
            events,
            inner: RwLock::new(LobbyInner {
                organizer: Some(config.organizer),
                roster: Roster::new(),
                locked: false,
                banned,
                started: false,
                removed: false,
            }),
        })
    }

    pub fn game_id(&self) -> u32 {
        self.game_id
    }

    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    pub fn variant(&self) -> GameVariant {
        self.variant
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    pub async fn is_locked(&self) -> bool {
        self.inner.read().await.locked
    }

    pub async fn player_infos(&self) -> Vec<PlayerInfo> {
        self.inner.read().await.roster.infos()
    }

    /// Claim a roster slot. Returns the accepted (trimmed) name.
    pub async fn add_player(&self, handle: UserHandle, name: &str) -> Result<String, String> {
        let name = name.trim().to_string();
        let (accepted, roster_update) = {
            let mut inner = self.inner.write().await;
            if inner.started || inner.removed {
                return Err("the game already started".to_string());
            }
            if inner.locked {
                return Err("the game is locked".to_string());
            }
            if name.is_empty() {
                return Err("username cannot be empty".to_string());
            }
            if inner.banned.contains(&name.to_lowercase()) {
                return Err("this username is banned".to_string());
            }
            if inner.roster.has_name(&name) {
                return Err("username unavailable".to_string());
            }
            inner.roster.add(Player::new(handle, name.clone()));
            (name, inner.roster.infos())
        };

        self.broadcast(ServerMessage::RosterUpdate {
            players: roster_update,
        })
        .await;
        let _ = self.events.send(GameEvent::PlayerJoined {
            name: accepted.clone(),
        });
        tracing::info!("player {} joined lobby {}", accepted, self.game_id);
        Ok(accepted)
    }

    /// Remove by name. Absent names are a no-op returning false.
    pub async fn remove_player(&self, name: &str, reason: RemovalReason) -> bool {
        let (removed_name, roster_update) = {
            let mut inner = self.inner.write().await;
            let Some(player) = inner.roster.remove(name) else {
                return false;
            };
            player.handle.emit(ServerMessage::Kicked { reason });
            (player.name, inner.roster.infos())
        };

        self.broadcast(ServerMessage::PlayerLeft {
            name: removed_name.clone(),
            reason,
        })
        .await;
        self.broadcast(ServerMessage::RosterUpdate {
            players: roster_update,
        })
        .await;
        let _ = self.events.send(GameEvent::UserRemoved {
            name: removed_name,
            reason,
        });
        true
    }

    /// Ban a name (case-insensitive, permanent for this lobby) and kick
    /// its current holder if present.
    pub async fn ban_player(&self, name: &str) -> bool {
        self.inner
            .write()
            .await
            .banned
            .insert(name.trim().to_lowercase());
        self.remove_player(name, RemovalReason::Banned).await
    }

    /// Flip the join lock. Returns the new state.
    pub async fn toggle_lock(&self) -> bool {
        let locked = {
            let mut inner = self.inner.write().await;
            inner.locked = !inner.locked;
            inner.locked
        };
        self.broadcast(ServerMessage::LockToggled { locked }).await;
        locked
    }

    /// Organizer left: kick everyone and tear the lobby down. There is no
    /// organizer rejoin.
    pub async fn remove_organizer(&self) {
        let players = {
            let mut inner = self.inner.write().await;
            if inner.removed {
                return;
            }
            inner.organizer = None;
            inner.roster.drain()
        };
        for player in players {
            player.handle.emit(ServerMessage::Kicked {
                reason: RemovalReason::OrganizerLeft,
            });
            let _ = self.events.send(GameEvent::UserRemoved {
                name: player.name,
                reason: RemovalReason::OrganizerLeft,
            });
        }
        let _ = self.events.send(GameEvent::UserRemoved {
            name: ORGANIZER_USERNAME.to_string(),
            reason: RemovalReason::OrganizerLeft,
        });
        self.clear_game().await;
    }

    /// Freeze the lobby into session ingredients. Fails (and leaves the
    /// lobby usable) unless it is locked and sufficiently populated.
    pub async fn take_for_start(&self) -> Result<(GameConfig, Vec<Player>), String> {
        let mut inner = self.inner.write().await;
        if inner.started {
            return Err("the game already started".to_string());
        }
        if !inner.locked {
            return Err("lock the game before starting".to_string());
        }
        if self.variant == GameVariant::Normal && inner.roster.is_empty() {
            return Err("cannot start with no players".to_string());
        }
        let organizer = inner
            .organizer
            .clone()
            .ok_or_else(|| "the organizer already left".to_string())?;
        inner.started = true;
        let players = inner.roster.drain();
        let _ = self.events.send(GameEvent::GameStarted);
        tracing::info!("lobby {} starting as {:?}", self.game_id, self.variant);
        Ok((
            GameConfig {
                organizer,
                game_id: self.game_id,
                quiz: self.quiz.clone(),
                variant: self.variant,
            },
            players,
        ))
    }

    /// Tear the lobby down. Fires the removal event exactly once.
    pub async fn clear_game(&self) {
        {
            let mut inner = self.inner.write().await;
            if inner.removed {
                return;
            }
            inner.removed = true;
        }
        let _ = self.events.send(GameEvent::GameRemoved);
        tracing::info!("lobby {} removed", self.game_id);
    }

    async fn broadcast(&self, msg: ServerMessage) {
        let inner = self.inner.read().await;
        inner.roster.broadcast(&msg);
        if let Some(organizer) = &inner.organizer {
            organizer.emit(msg);
        }
    }
}
