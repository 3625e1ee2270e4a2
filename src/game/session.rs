//! Running game session: timer-driven walk through a quiz's questions.
//!
//! One session type covers all variants; the behavior matrix (who plays,
//! what advances, whether QRL pauses for grading) lives in the
//! `GameVariant` policy hooks rather than a type hierarchy.

use crate::cursor::QuestionCursor;
use crate::game::user::{AnswerState, Player, UserHandle};
use crate::game::{GameConfig, GameEvent, Roster, EVENT_CHANNEL_CAPACITY};
use crate::protocol::{PublicQuestion, ServerMessage};
use crate::timer::Timer;
use crate::types::*;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

pub struct GameSession {
    game_id: u32,
    quiz: Quiz,
    variant: GameVariant,
    pub(crate) timer: Timer,
    pub(crate) events: broadcast::Sender<GameEvent>,
    pub(crate) inner: RwLock<SessionInner>,
}

pub(crate) struct SessionInner {
    pub(crate) organizer: Option<UserHandle>,
    pub(crate) roster: Roster,
    pub(crate) state: GameState,
    pub(crate) cursor: QuestionCursor,
    /// Normal mode: set after scoring/correction, consumed by
    /// `continue_quiz`.
    pub(crate) can_advance: bool,
    /// Set when every roster player has confirmed; the timer's stop
    /// condition reads it at tick boundaries.
    pub(crate) all_submitted: bool,
    /// Names in confirmation order; decides the first-correct bonus.
    pub(crate) confirm_order: Vec<String>,
    pub(crate) stats_history: Vec<AnswerStats>,
    pub(crate) panic_threshold: u32,
    pub(crate) panic_active: bool,
    pub(crate) removed: bool,
}

impl GameSession {
    /// Build a session from a frozen lobby config and roster. The roster
    /// assembly is the variant's call: Random adds the organizer as a
    /// synthetic player, Test makes them the sole participant.
    pub fn from_config(config: GameConfig, lobby_players: Vec<Player>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut roster = Roster::new();
        for player in lobby_players {
            roster.add(player);
        }
        if config.variant.organizer_plays() {
            roster.add(Player::new(
                config.organizer.clone(),
                ORGANIZER_USERNAME.to_string(),
            ));
        }

        Arc::new(Self {
            game_id: config.game_id,
            variant: config.variant,
            timer: Timer::new(),
            events,
            inner: RwLock::new(SessionInner {
                organizer: Some(config.organizer),
                roster,
                state: GameState::Lobby,
                cursor: QuestionCursor::new(&config.quiz),
                can_advance: false,
                all_submitted: false,
                confirm_order: Vec::new(),
                stats_history: Vec::new(),
                panic_threshold: 0,
                panic_active: false,
                removed: false,
            }),
            quiz: config.quiz,
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

    pub async fn state(&self) -> GameState {
        self.inner.read().await.state
    }

    pub async fn player_infos(&self) -> Vec<PlayerInfo> {
        self.inner.read().await.roster.infos()
    }

    /// Kick off the session: loading countdown, or straight to the first
    /// question for a test game.
    pub async fn set_up(self: &Arc<Self>) {
        if self.variant.skips_loading() {
            self.next_question().await;
            return;
        }
        {
            self.inner.write().await.state = GameState::Loading;
        }
        self.broadcast(ServerMessage::StateChanged {
            state: GameState::Loading,
        })
        .await;

        let on_ended = self.weak_callback(|session| async move {
            session.next_question().await;
        });
        self.timer
            .clear_specific_callbacks()
            .clear_stop_condition()
            .set_on_tick(self.tick_broadcaster())
            .set_on_ended(on_ended);
        self.timer.start_timer(LOADING_DURATION_S);
    }

    /// Advance the cursor and open the next answer window.
    pub(crate) async fn next_question(self: &Arc<Self>) {
        let advanced = {
            let mut inner = self.inner.write().await;
            if inner.removed {
                return;
            }
            inner.cursor.advance()
        };
        let Some(current) = advanced else {
            self.finish_quiz().await;
            return;
        };

        let duration = match current.question.question_type {
            QuestionType::Qcm => self.quiz.duration,
            QuestionType::Qrl => QRL_DURATION_S,
        };
        let threshold = match current.question.question_type {
            QuestionType::Qcm => PANIC_THRESHOLD_QCM_S,
            QuestionType::Qrl => PANIC_THRESHOLD_QRL_S,
        };

        {
            let mut inner = self.inner.write().await;
            inner.state = GameState::InGame;
            inner.can_advance = false;
            inner.all_submitted = false;
            inner.confirm_order.clear();
            inner.panic_threshold = threshold;
            inner.panic_active = false;
            for player in inner.roster.iter_mut() {
                player.reset_answer();
            }
        }

        self.broadcast(ServerMessage::StateChanged {
            state: GameState::InGame,
        })
        .await;
        {
            let inner = self.inner.read().await;
            inner.roster.broadcast(&ServerMessage::Question {
                question: PublicQuestion::from(&current.question),
                index: current.index,
                total: self.quiz.questions.len(),
            });
            // Only a non-playing organizer may see the correct flags.
            if self.variant == GameVariant::Normal {
                if let Some(organizer) = &inner.organizer {
                    organizer.emit(ServerMessage::OrganizerQuestion {
                        question: current.question.clone(),
                        index: current.index,
                        total: self.quiz.questions.len(),
                    });
                }
            }
        }
        let _ = self.events.send(GameEvent::QuestionStarted {
            index: current.index,
        });
        tracing::debug!(
            "game {}: question {} open for {}s",
            self.game_id,
            current.index,
            duration
        );

        let panic_notice = self.weak_callback(|session| async move {
            session.emit_organizer(ServerMessage::PanicAvailable).await;
        });
        let stop_weak = Arc::downgrade(self);
        let on_ended = self.weak_callback(|session| async move {
            session.question_ended().await;
        });
        self.timer
            .clear_specific_callbacks()
            .set_on_tick(self.tick_broadcaster())
            .set_specific_callback(threshold, panic_notice)
            .set_stop_condition(Arc::new(move || {
                let weak = stop_weak.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(session) => session.inner.read().await.all_submitted,
                        None => true,
                    }
                })
            }))
            .set_on_ended(on_ended);
        self.timer.start_timer(duration);
    }

    /// Decide what follows a scored question: leaderboard, an automatic
    /// intermission, or waiting on the organizer.
    pub(crate) async fn after_question(self: &Arc<Self>) {
        let has_next = {
            let inner = self.inner.read().await;
            if inner.removed {
                return;
            }
            inner.cursor.has_next()
        };
        if !has_next {
            self.finish_quiz().await;
            return;
        }
        if self.variant.auto_advances() {
            self.begin_intermission().await;
        } else {
            self.inner.write().await.can_advance = true;
        }
    }

    /// Organizer go-ahead in Normal mode. A no-op unless the current
    /// question has been fully scored (and corrected, for QRL).
    pub async fn continue_quiz(self: &Arc<Self>) -> bool {
        {
            let mut inner = self.inner.write().await;
            if inner.removed || !inner.can_advance {
                return false;
            }
            inner.can_advance = false;
        }
        self.begin_intermission().await;
        true
    }

    pub(crate) async fn begin_intermission(self: &Arc<Self>) {
        {
            let mut inner = self.inner.write().await;
            if inner.removed {
                return;
            }
            inner.state = GameState::Intermission;
        }
        self.broadcast(ServerMessage::StateChanged {
            state: GameState::Intermission,
        })
        .await;

        let on_ended = self.weak_callback(|session| async move {
            session.next_question().await;
        });
        self.timer
            .clear_specific_callbacks()
            .clear_stop_condition()
            .set_on_tick(self.tick_broadcaster())
            .set_on_ended(on_ended);
        self.timer.start_timer(INTERMISSION_DURATION_S);
    }

    /// Last question done: leaderboard broadcast (or the test-finished
    /// signal) followed by self-teardown.
    pub(crate) async fn finish_quiz(self: &Arc<Self>) {
        if self.variant == GameVariant::Test {
            self.emit_organizer(ServerMessage::TestFinished).await;
            self.clear_game().await;
            return;
        }

        let (stats, players, best_score) = {
            let mut inner = self.inner.write().await;
            if inner.removed {
                return;
            }
            inner.state = GameState::Leaderboard;
            let best_score = inner.roster.iter().map(|p| p.score).max().unwrap_or(0);
            (inner.stats_history.clone(), inner.roster.infos(), best_score)
        };
        self.broadcast(ServerMessage::StateChanged {
            state: GameState::Leaderboard,
        })
        .await;
        self.broadcast(ServerMessage::StatsHistory { stats, players })
            .await;
        let _ = self.events.send(GameEvent::QuizEnded { best_score });
        self.clear_game().await;
    }

    /// Remove a player by name. Absent names are a no-op returning
    /// false, which keeps duplicate disconnect notifications harmless.
    pub async fn remove_player(self: &Arc<Self>, name: &str, reason: RemovalReason) -> bool {
        let (removed_name, roster_update, real_players_left) = {
            let mut inner = self.inner.write().await;
            let Some(player) = inner.roster.remove(name) else {
                return false;
            };
            player.handle.emit(ServerMessage::Kicked { reason });
            inner
                .confirm_order
                .retain(|n| !n.eq_ignore_ascii_case(name));
            // The departure may leave everyone else confirmed.
            if inner.state == GameState::InGame
                && !inner.roster.is_empty()
                && inner
                    .roster
                    .iter()
                    .all(|p| p.answer_state == AnswerState::Confirmed)
            {
                inner.all_submitted = true;
            }
            let real_players_left = inner
                .roster
                .iter()
                .filter(|p| !p.name.eq_ignore_ascii_case(ORGANIZER_USERNAME))
                .count();
            (player.name, inner.roster.infos(), real_players_left)
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

        match self.variant {
            GameVariant::Normal => {
                if real_players_left == 0 {
                    // Nobody left to play for: notify and pull the
                    // organizer out too.
                    self.emit_organizer(ServerMessage::Kicked {
                        reason: RemovalReason::NoPlayersLeft,
                    })
                    .await;
                    let _ = self.events.send(GameEvent::UserRemoved {
                        name: ORGANIZER_USERNAME.to_string(),
                        reason: RemovalReason::NoPlayersLeft,
                    });
                    self.inner.write().await.organizer = None;
                    self.clear_game().await;
                }
            }
            GameVariant::Random => {
                if real_players_left == 0 {
                    self.clear_game().await;
                }
            }
            GameVariant::Test => {
                self.clear_game().await;
            }
        }
        true
    }

    /// Organizer left: every player is kicked and the session tears
    /// down. One-directional; there is no rejoin.
    pub async fn remove_organizer(self: &Arc<Self>) {
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

    /// Tear down: stop the timer so nothing fires into a dead game, and
    /// announce the removal exactly once.
    pub async fn clear_game(&self) {
        {
            let mut inner = self.inner.write().await;
            if inner.removed {
                return;
            }
            inner.removed = true;
        }
        self.timer.stop_timer();
        let _ = self.events.send(GameEvent::GameRemoved);
        tracing::info!("game {} removed", self.game_id);
    }

    /// Accelerate the countdown once it is under the question-type
    /// threshold.
    pub async fn start_panic_mode(&self) -> bool {
        let eligible = {
            let inner = self.inner.read().await;
            inner.state == GameState::InGame
                && !inner.panic_active
                && self.timer.remaining() > 0
                && self.timer.remaining() <= inner.panic_threshold
        };
        if !eligible {
            return false;
        }
        self.inner.write().await.panic_active = true;
        self.timer.update_delay(PANIC_TICK_MS);
        self.broadcast(ServerMessage::PanicModeStarted).await;
        true
    }

    /// Suspend or resume the answer countdown. Returns the new paused
    /// state, or `None` outside a question.
    pub async fn toggle_pause(&self) -> Option<bool> {
        if self.inner.read().await.state != GameState::InGame {
            return None;
        }
        let paused = self.timer.toggle_pause();
        self.broadcast(ServerMessage::PauseToggled { paused }).await;
        Some(paused)
    }

    /// Send to every participant, once each. The organizer's handle may
    /// also sit in the roster (Random, Test) and must not hear double.
    pub(crate) async fn broadcast(&self, msg: ServerMessage) {
        let inner = self.inner.read().await;
        inner.roster.broadcast(&msg);
        if let Some(organizer) = &inner.organizer {
            if !inner.roster.iter().any(|p| p.handle.id() == organizer.id()) {
                organizer.emit(msg);
            }
        }
    }

    pub(crate) async fn emit_organizer(&self, msg: ServerMessage) {
        if let Some(organizer) = &self.inner.read().await.organizer {
            organizer.emit(msg);
        }
    }

    fn tick_broadcaster(self: &Arc<Self>) -> crate::timer::TickCallback {
        let weak = Arc::downgrade(self);
        Arc::new(move |remaining| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(session) = weak.upgrade() {
                    session
                        .broadcast(ServerMessage::TimerTick { remaining })
                        .await;
                }
            })
        })
    }

    /// Wrap a session method as a timer callback holding only a weak
    /// reference, so a torn-down game cannot be kept alive by its timer.
    fn weak_callback<F, Fut>(self: &Arc<Self>, body: F) -> crate::timer::EndedCallback
    where
        F: Fn(Arc<Self>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        let body = Arc::new(body);
        Arc::new(move || {
            let weak = weak.clone();
            let body = Arc::clone(&body);
            Box::pin(async move {
                if let Some(session) = weak.upgrade() {
                    body(session).await;
                }
            })
        })
    }
}
