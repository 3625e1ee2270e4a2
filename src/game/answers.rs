//! Answer collection and the scoring pipeline.
//!
//! Players interact with the active question (pick choices, type text),
//! then confirm; the answer window closes when the timer elapses or
//! everyone has confirmed. QCM questions are graded mechanically, QRL
//! questions go through organizer correction in Normal mode and a flat
//! auto-grade otherwise.

use crate::game::session::GameSession;
use crate::game::user::AnswerState;
use crate::protocol::{PlayerGrade, QrlAnswer, ServerMessage};
use crate::scoring::{stats_for, tally_choices, tally_grades, Grade, QcmCorrector};
use crate::types::{GameState, QuestionType, QuestionWithIndex};
use std::sync::Arc;

impl GameSession {
    /// Replace a player's QCM picks. The organizer sees the live tally;
    /// players never do.
    pub async fn update_selection(&self, name: &str, choices: Vec<usize>) -> Result<(), String> {
        let stats = {
            let mut inner = self.inner.write().await;
            if inner.state != GameState::InGame {
                return Err("no question is active".to_string());
            }
            let current = inner.cursor.current().ok_or("no question is active")?;
            if current.question.question_type != QuestionType::Qcm {
                return Err("not a multiple-choice question".to_string());
            }
            let choice_count = current.question.choices.len();

            let player = inner.roster.get_mut(name).ok_or("unknown player")?;
            if player.answer_state == AnswerState::Confirmed {
                return Err("answer already confirmed".to_string());
            }
            let mut picks: Vec<usize> =
                choices.into_iter().filter(|&c| c < choice_count).collect();
            picks.sort_unstable();
            picks.dedup();
            player.selection = picks;
            player.answer_state = AnswerState::Interacting;

            stats_for(
                current.index,
                tally_choices(choice_count, inner.roster.iter().map(|p| &p.selection)),
            )
        };
        self.emit_organizer(ServerMessage::SelectionStats { stats })
            .await;
        Ok(())
    }

    /// Replace a player's QRL free-text answer.
    pub async fn update_answer(&self, name: &str, text: String) -> Result<(), String> {
        let mut inner = self.inner.write().await;
        if inner.state != GameState::InGame {
            return Err("no question is active".to_string());
        }
        let current = inner.cursor.current().ok_or("no question is active")?;
        if current.question.question_type != QuestionType::Qrl {
            return Err("not a free-text question".to_string());
        }
        let player = inner.roster.get_mut(name).ok_or("unknown player")?;
        if player.answer_state == AnswerState::Confirmed {
            return Err("answer already confirmed".to_string());
        }
        player.answer_text = text;
        player.answer_state = AnswerState::Interacting;
        Ok(())
    }

    /// Lock in the current answer. When the whole roster has confirmed,
    /// the countdown is cut short at the next tick.
    pub async fn confirm_answer(&self, name: &str) -> Result<(), String> {
        let mut inner = self.inner.write().await;
        if inner.state != GameState::InGame {
            return Err("no question is active".to_string());
        }
        let player = inner.roster.get_mut(name).ok_or("unknown player")?;
        if player.answer_state == AnswerState::Confirmed {
            return Err("answer already confirmed".to_string());
        }
        player.answer_state = AnswerState::Confirmed;
        let confirmed_name = player.name.clone();
        inner.confirm_order.push(confirmed_name);
        if inner
            .roster
            .iter()
            .all(|p| p.answer_state == AnswerState::Confirmed)
        {
            inner.all_submitted = true;
        }
        Ok(())
    }

    /// The answer window closed: grade, publish stats, and move on (or
    /// pause for correction).
    pub(crate) async fn question_ended(self: &Arc<Self>) {
        let current = {
            let inner = self.inner.read().await;
            if inner.removed {
                return;
            }
            inner.cursor.current()
        };
        let Some(current) = current else {
            return;
        };

        match current.question.question_type {
            QuestionType::Qcm => {
                self.close_qcm_question(&current).await;
                self.after_question().await;
            }
            QuestionType::Qrl => {
                if self.variant().grades_qrl() {
                    self.enter_correction().await;
                } else if self.variant() == crate::types::GameVariant::Test {
                    // Solo practice: full credit, no grading step.
                    self.auto_grade_qrl(&current, Grade::Full).await;
                    self.after_question().await;
                } else {
                    // Random games skip organizer correction entirely.
                    self.auto_grade_qrl(&current, Grade::Zero).await;
                    self.after_question().await;
                }
            }
        }
    }

    /// Grade every player's final selection. The first player to have
    /// confirmed a correct answer takes the bonus.
    async fn close_qcm_question(&self, current: &QuestionWithIndex) {
        let (stats, players) = {
            let mut inner = self.inner.write().await;
            let corrector = QcmCorrector::new(&current.question);

            let bonus_winner = inner
                .confirm_order
                .iter()
                .find(|name| {
                    inner
                        .roster
                        .get(name)
                        .map(|p| corrector.is_exact(&p.selection))
                        .unwrap_or(false)
                })
                .cloned();

            for player in inner.roster.iter_mut() {
                let first_correct = bonus_winner.as_deref() == Some(player.name.as_str());
                let verdict = corrector.grade(&player.selection, first_correct);
                player.score += verdict.points;
                if verdict.bonus {
                    player.bonus_count += 1;
                }
                player.handle.emit(ServerMessage::CorrectionMessage {
                    text: verdict.message,
                });
            }

            let counts = tally_choices(
                current.question.choices.len(),
                inner.roster.iter().map(|p| &p.selection),
            );
            inner.stats_history.push(stats_for(current.index, counts));
            (inner.stats_history.clone(), inner.roster.infos())
        };
        self.broadcast(ServerMessage::StatsHistory { stats, players })
            .await;
    }

    /// QRL in Normal mode: hold the game while the organizer grades.
    async fn enter_correction(&self) {
        let answers = {
            let mut inner = self.inner.write().await;
            inner.state = GameState::Correction;
            let mut answers: Vec<QrlAnswer> = inner
                .roster
                .iter()
                .map(|p| QrlAnswer {
                    name: p.name.clone(),
                    text: p.answer_text.clone(),
                })
                .collect();
            answers.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            answers
        };
        self.broadcast(ServerMessage::StateChanged {
            state: GameState::Correction,
        })
        .await;
        self.emit_organizer(ServerMessage::QrlAnswers { answers })
            .await;
    }

    /// Apply the organizer's grade batch and resume the question flow.
    pub async fn finish_correction(
        self: &Arc<Self>,
        grades: Vec<PlayerGrade>,
    ) -> Result<(), String> {
        let (stats, players) = {
            let mut inner = self.inner.write().await;
            if inner.state != GameState::Correction {
                return Err("no correction in progress".to_string());
            }
            let current = inner.cursor.current().ok_or("no question is active")?;

            let mut applied = Vec::new();
            for grade in &grades {
                let points = grade.grade.apply(current.question.points);
                if let Some(player) = inner.roster.get_mut(&grade.name) {
                    player.score += points;
                    player.handle.emit(ServerMessage::CorrectionMessage {
                        text: format!("You earned {} points.", points),
                    });
                    applied.push(grade.grade);
                }
            }
            inner
                .stats_history
                .push(stats_for(current.index, tally_grades(applied.iter())));
            (inner.stats_history.clone(), inner.roster.infos())
        };
        self.broadcast(ServerMessage::StatsHistory { stats, players })
            .await;
        self.after_question().await;
        Ok(())
    }

    /// Flat grade for variants without a correction step.
    async fn auto_grade_qrl(&self, current: &QuestionWithIndex, grade: Grade) {
        let (stats, players) = {
            let mut inner = self.inner.write().await;
            let points = grade.apply(current.question.points);
            let mut applied = Vec::new();
            for player in inner.roster.iter_mut() {
                player.score += points;
                player.handle.emit(ServerMessage::CorrectionMessage {
                    text: format!("You earned {} points.", points),
                });
                applied.push(grade);
            }
            inner
                .stats_history
                .push(stats_for(current.index, tally_grades(applied.iter())));
            (inner.stats_history.clone(), inner.roster.infos())
        };
        self.broadcast(ServerMessage::StatsHistory { stats, players })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::user::UserHandle;
    use crate::game::{GameConfig, GameEvent};
    use crate::types::*;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn qcm_question(id: &str, points: u32) -> Question {
        Question {
            id: id.to_string(),
            question_type: QuestionType::Qcm,
            text: format!("question {id}"),
            points,
            choices: vec![
                Choice {
                    text: "right".to_string(),
                    is_correct: true,
                },
                Choice {
                    text: "wrong".to_string(),
                    is_correct: false,
                },
                Choice {
                    text: "also wrong".to_string(),
                    is_correct: false,
                },
            ],
            last_modification: None,
        }
    }

    fn qrl_question(id: &str, points: u32) -> Question {
        Question {
            id: id.to_string(),
            question_type: QuestionType::Qrl,
            text: format!("explain {id}"),
            points,
            choices: Vec::new(),
            last_modification: None,
        }
    }

    fn quiz(questions: Vec<Question>) -> Quiz {
        Quiz {
            id: "quiz".to_string(),
            title: "Systems".to_string(),
            description: "d".to_string(),
            duration: 10,
            questions,
            hidden: false,
            last_modification: None,
        }
    }

    struct TestGame {
        session: std::sync::Arc<GameSession>,
        organizer_rx: UnboundedReceiver<ServerMessage>,
        player_rxs: Vec<(String, UnboundedReceiver<ServerMessage>)>,
    }

    fn build(variant: GameVariant, quiz: Quiz, player_names: &[&str]) -> TestGame {
        let (organizer, organizer_rx) = UserHandle::new();
        let mut players = Vec::new();
        let mut player_rxs = Vec::new();
        for name in player_names {
            let (handle, rx) = UserHandle::new();
            players.push(crate::game::user::Player::new(handle, name.to_string()));
            player_rxs.push((name.to_string(), rx));
        }
        let session = GameSession::from_config(
            GameConfig {
                organizer,
                game_id: 4217,
                quiz,
                variant,
            },
            players,
        );
        TestGame {
            session,
            organizer_rx,
            player_rxs,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_then_first_question() {
        let mut game = build(
            GameVariant::Normal,
            quiz(vec![qcm_question("a", 10)]),
            &["ada"],
        );
        game.session.set_up().await;
        assert_eq!(game.session.state().await, GameState::Loading);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(game.session.state().await, GameState::InGame);

        let messages = drain(&mut game.player_rxs[0].1);
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::Question { index: 0, .. })));
        // Players never see correct-answer flags.
        assert!(!messages
            .iter()
            .any(|m| matches!(m, ServerMessage::OrganizerQuestion { .. })));
        // The non-playing organizer does.
        let organizer_messages = drain(&mut game.organizer_rx);
        assert!(organizer_messages
            .iter()
            .any(|m| matches!(m, ServerMessage::OrganizerQuestion { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_confirmed_cuts_window_and_awards_single_bonus() {
        let mut game = build(
            GameVariant::Normal,
            quiz(vec![qcm_question("a", 10), qcm_question("b", 10)]),
            &["ada", "bob"],
        );
        game.session.set_up().await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        game.session.update_selection("ada", vec![0]).await.unwrap();
        game.session.update_selection("bob", vec![0]).await.unwrap();
        game.session.confirm_answer("ada").await.unwrap();
        game.session.confirm_answer("bob").await.unwrap();

        // The stop condition is polled at the next tick.
        tokio::time::sleep(Duration::from_secs(2)).await;

        let infos = game.session.player_infos().await;
        let ada = infos.iter().find(|p| p.name == "ada").unwrap();
        let bob = infos.iter().find(|p| p.name == "bob").unwrap();
        assert_eq!(ada.score, 12, "first correct confirmer gets 10 * 1.2");
        assert_eq!(ada.bonus_count, 1);
        assert_eq!(bob.score, 10);
        assert_eq!(bob.bonus_count, 0);

        let messages = drain(&mut game.player_rxs[0].1);
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::CorrectionMessage { text } if text.contains("bonus"))));
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::StatsHistory { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_set_required_for_points() {
        let mut game = build(
            GameVariant::Normal,
            quiz(vec![qcm_question("a", 40)]),
            &["ada", "bob"],
        );
        game.session.set_up().await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        // Superset for ada, nothing for bob.
        game.session
            .update_selection("ada", vec![0, 1])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;

        let infos = game.session.player_infos().await;
        assert!(infos.iter().all(|p| p.score == 0));
        let organizer_messages = drain(&mut game.organizer_rx);
        assert!(organizer_messages
            .iter()
            .any(|m| matches!(m, ServerMessage::SelectionStats { stats } if stats.bar_counts == vec![1, 1, 0])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_continue_quiz_gated_until_scoring_done() {
        let game = build(
            GameVariant::Normal,
            quiz(vec![qcm_question("a", 10), qcm_question("b", 10)]),
            &["ada"],
        );
        game.session.set_up().await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        // Mid-question: the organizer cannot skip ahead.
        assert!(!game.session.continue_quiz().await);
        assert_eq!(game.session.state().await, GameState::InGame);

        // Let the window elapse; scoring sets the advance flag.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(game.session.continue_quiz().await);
        assert_eq!(game.session.state().await, GameState::Intermission);

        // Flag is consumed; a second continue is a no-op.
        assert!(!game.session.continue_quiz().await);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(game.session.state().await, GameState::InGame);
    }

    #[tokio::test(start_paused = true)]
    async fn test_normal_qrl_enters_correction_and_grades_apply() {
        let mut game = build(
            GameVariant::Normal,
            quiz(vec![qrl_question("a", 50)]),
            &["ada", "bob"],
        );
        game.session.set_up().await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        game.session
            .update_answer("ada", "because of the borrow checker".to_string())
            .await
            .unwrap();
        game.session.confirm_answer("ada").await.unwrap();
        game.session.confirm_answer("bob").await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(game.session.state().await, GameState::Correction);
        // The organizer cannot advance while grading is open.
        assert!(!game.session.continue_quiz().await);
        let organizer_messages = drain(&mut game.organizer_rx);
        let answers = organizer_messages
            .iter()
            .find_map(|m| match m {
                ServerMessage::QrlAnswers { answers } => Some(answers.clone()),
                _ => None,
            })
            .expect("organizer should receive the answers to grade");
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].name, "ada");

        game.session
            .finish_correction(vec![
                PlayerGrade {
                    name: "ada".to_string(),
                    grade: Grade::Full,
                },
                PlayerGrade {
                    name: "bob".to_string(),
                    grade: Grade::Half,
                },
            ])
            .await
            .unwrap();

        let infos = game.session.player_infos().await;
        assert_eq!(infos.iter().find(|p| p.name == "ada").unwrap().score, 50);
        assert_eq!(infos.iter().find(|p| p.name == "bob").unwrap().score, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_qrl_skips_correction() {
        let game = build(
            GameVariant::Random,
            quiz(vec![qrl_question("a", 50), qcm_question("b", 10)]),
            &["ada"],
        );
        game.session.set_up().await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(game.session.state().await, GameState::InGame);

        // Let the QRL window elapse fully: no Correction state, straight
        // to the intermission before question 2.
        tokio::time::sleep(Duration::from_secs(61)).await;
        let state = game.session.state().await;
        assert_ne!(state, GameState::Correction);
        assert!(
            state == GameState::Intermission || state == GameState::InGame,
            "random mode auto-advances, got {state:?}"
        );

        // Flat zero credit in random mode.
        let infos = game.session.player_infos().await;
        assert_eq!(infos.iter().find(|p| p.name == "ada").unwrap().score, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_roster_includes_synthetic_organizer() {
        let game = build(
            GameVariant::Random,
            quiz(vec![qcm_question("a", 10)]),
            &["ada"],
        );
        let names: Vec<String> = game
            .session
            .player_infos()
            .await
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert!(names.contains(&"ada".to_string()));
        assert!(names.contains(&ORGANIZER_USERNAME.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_game_skips_loading_and_signals_finish() {
        let mut game = build(GameVariant::Test, quiz(vec![qrl_question("a", 50)]), &[]);
        game.session.set_up().await;
        // No loading phase: the question is live immediately.
        assert_eq!(game.session.state().await, GameState::InGame);

        game.session
            .confirm_answer(ORGANIZER_USERNAME)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let messages = drain(&mut game.organizer_rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::TestFinished)));
        // Solo practice QRL is auto-graded at full credit.
        assert!(messages.iter().any(
            |m| matches!(m, ServerMessage::CorrectionMessage { text } if text.contains("50"))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_player_is_idempotent_and_game_continues() {
        let game = build(
            GameVariant::Normal,
            quiz(vec![qcm_question("a", 10)]),
            &["ada", "bob"],
        );
        game.session.set_up().await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert!(
            game.session
                .remove_player("ada", RemovalReason::Left)
                .await
        );
        assert!(
            !game.session
                .remove_player("ada", RemovalReason::Left)
                .await,
            "second removal is a no-op"
        );
        assert_eq!(game.session.state().await, GameState::InGame);
        assert_eq!(game.session.player_infos().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_player_leaving_tears_down_and_notifies_organizer() {
        let mut game = build(
            GameVariant::Normal,
            quiz(vec![qcm_question("a", 10)]),
            &["ada", "bob"],
        );
        let mut events = game.session.subscribe();
        game.session.set_up().await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        game.session.remove_player("ada", RemovalReason::Left).await;
        game.session.remove_player("bob", RemovalReason::Left).await;

        let organizer_messages = drain(&mut game.organizer_rx);
        assert!(organizer_messages.iter().any(|m| matches!(
            m,
            ServerMessage::Kicked {
                reason: RemovalReason::NoPlayersLeft
            }
        )));

        let mut saw_removed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, GameEvent::GameRemoved) {
                saw_removed = true;
            }
        }
        assert!(saw_removed);

        // The stopped timer never fires into the dead game.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(game.session.state().await, GameState::InGame);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_quiz_reaches_leaderboard_with_best_score() {
        let game = build(
            GameVariant::Normal,
            quiz(vec![qcm_question("a", 10)]),
            &["ada"],
        );
        let mut events = game.session.subscribe();
        game.session.set_up().await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        game.session.update_selection("ada", vec![0]).await.unwrap();
        game.session.confirm_answer("ada").await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(game.session.state().await, GameState::Leaderboard);

        let mut best = None;
        while let Ok(event) = events.try_recv() {
            if let GameEvent::QuizEnded { best_score } = event {
                best = Some(best_score);
            }
        }
        assert_eq!(best, Some(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_mode_requires_threshold() {
        let game = build(
            GameVariant::Normal,
            quiz(vec![qcm_question("a", 10)]),
            &["ada"],
        );
        game.session.set_up().await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        // Question duration is 10s, threshold for QCM is 10s: panic is
        // available right away here.
        assert!(game.session.start_panic_mode().await);
        // Second trigger is refused.
        assert!(!game.session.start_panic_mode().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_only_inside_question() {
        let game = build(
            GameVariant::Normal,
            quiz(vec![qcm_question("a", 10)]),
            &["ada"],
        );
        game.session.set_up().await;
        // Still loading.
        assert_eq!(game.session.toggle_pause().await, None);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(game.session.toggle_pause().await, Some(true));
        let frozen = game.session.timer.remaining();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(game.session.timer.remaining(), frozen);
        assert_eq!(game.session.toggle_pause().await, Some(false));
    }
}
