//! Live game entities: waiting-room lobby, running session, and the
//! plumbing they share.

pub mod answers;
pub mod lobby;
pub mod session;
pub mod user;

use crate::protocol::ServerMessage;
use crate::types::{GameVariant, PlayerInfo, Quiz, RemovalReason};
use user::{Player, UserHandle};

/// Capacity of each game's lifecycle event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Immutable blueprint handed to every game constructor.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub organizer: UserHandle,
    pub game_id: u32,
    pub quiz: Quiz,
    pub variant: GameVariant,
}

/// Lifecycle notifications emitted by a game instance. One event per
/// logical transition; subscribers only see events sent after they
/// subscribed.
#[derive(Debug, Clone)]
pub enum GameEvent {
    PlayerJoined { name: String },
    UserRemoved { name: String, reason: RemovalReason },
    GameStarted,
    QuestionStarted { index: usize },
    QuizEnded { best_score: u32 },
    GameRemoved,
}

/// Insertion-ordered player list with case-insensitive name lookup.
/// Mutated only by the owning game.
#[derive(Debug, Default)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, player: Player) {
        self.players.push(player);
    }

    /// Remove by name. Absent names are a silent no-op so duplicate
    /// disconnect notifications stay harmless.
    pub fn remove(&mut self, name: &str) -> Option<Player> {
        let position = self
            .players
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))?;
        Some(self.players.remove(position))
    }

    pub fn get(&self, name: &str) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Player> {
        self.players
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.iter_mut()
    }

    pub fn drain(&mut self) -> Vec<Player> {
        std::mem::take(&mut self.players)
    }

    /// Roster snapshot in join order.
    pub fn infos(&self) -> Vec<PlayerInfo> {
        self.players.iter().map(Player::info).collect()
    }

    pub fn broadcast(&self, msg: &ServerMessage) {
        for player in &self.players {
            player.handle.emit(msg.clone());
        }
    }
}
