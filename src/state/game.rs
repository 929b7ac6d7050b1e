//! In-memory per-game session state: players, the current question runtime,
//! and the buzz/answer bookkeeping the arbiter works on.

use std::collections::{HashMap, HashSet};

use crate::dao::models::{QuestionEntity, QuestionKind};
use crate::dto::ws::ClientTimestamps;

/// Points awarded when a question does not declare a value.
pub const DEFAULT_QUESTION_POINTS: u32 = 10;
/// Upper clamp applied to answer response times.
pub const MAX_ANSWER_RESPONSE_TIME_MS: u64 = 120_000;

/// Lifecycle status of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Created,
    Started,
    Paused,
    Ended,
}

/// Console-tunable settings attached to a game.
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub mcq_duration_ms: u64,
    pub buzzer_duration_ms: u64,
    pub show_correct_answer: bool,
    pub show_intermediate_ranking: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            mcq_duration_ms: 30_000,
            buzzer_duration_ms: 15_000,
            show_correct_answer: true,
            show_intermediate_ranking: true,
        }
    }
}

/// Cumulative per-player statistics within a game.
///
/// Identity is the buzzer ID, so a device reconnecting mid-game keeps its
/// score.
#[derive(Debug, Clone)]
pub struct Player {
    pub buzzer_id: String,
    pub name: String,
    pub score: i64,
    pub correct_answers: u32,
    pub total_answers: u32,
    pub total_response_time_ms: u64,
    pub fastest_response_ms: Option<u64>,
    pub slowest_response_ms: Option<u64>,
}

impl Player {
    fn new(buzzer_id: String, name: String) -> Self {
        Self {
            buzzer_id,
            name,
            score: 0,
            correct_answers: 0,
            total_answers: 0,
            total_response_time_ms: 0,
            fastest_response_ms: None,
            slowest_response_ms: None,
        }
    }

    fn record(&mut self, is_correct: bool, points: u32, response_time_ms: u64) {
        self.total_answers += 1;
        if is_correct {
            self.correct_answers += 1;
            self.score += i64::from(points);
        }
        self.total_response_time_ms += response_time_ms;
        self.fastest_response_ms = Some(match self.fastest_response_ms {
            Some(fastest) => fastest.min(response_time_ms),
            None => response_time_ms,
        });
        self.slowest_response_ms = Some(match self.slowest_response_ms {
            Some(slowest) => slowest.max(response_time_ms),
            None => response_time_ms,
        });
    }
}

/// One answer accepted for the current question.
#[derive(Debug, Clone)]
pub struct RecordedAnswer {
    pub answer: Option<String>,
    pub is_correct: bool,
    pub points: u32,
    pub response_time_ms: u64,
}

/// One buzz awaiting (or past) arbitration.
#[derive(Debug, Clone)]
pub struct PendingBuzz {
    pub buzzer_id: String,
    pub response_time_ms: u64,
    pub timestamps: ClientTimestamps,
    pub received_at_ms: u64,
    pub processed: bool,
}

/// Mutable state scoped to the question currently on the floor.
#[derive(Debug)]
pub struct QuestionRuntime {
    pub question_id: u32,
    /// Server instant the question was dispatched, ms since epoch.
    pub started_at_ms: u64,
    pub answers: HashMap<String, RecordedAnswer>,
    pub excluded: HashSet<String>,
    pub pending_buzzes: Vec<PendingBuzz>,
    pub buzzer_locked: bool,
    pub current_winner: Option<String>,
    /// Whether an evaluation timer is currently armed.
    pub evaluation_armed: bool,
    /// Monotonic per-game counter; a stale timer callback must no-op.
    pub epoch: u64,
}

impl QuestionRuntime {
    fn new(question_id: u32, started_at_ms: u64, epoch: u64) -> Self {
        Self {
            question_id,
            started_at_ms,
            answers: HashMap::new(),
            excluded: HashSet::new(),
            pending_buzzes: Vec::new(),
            buzzer_locked: false,
            current_winner: None,
            evaluation_armed: false,
            epoch,
        }
    }
}

/// Outcome of [`GameSession::record_answer`].
#[derive(Debug, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// No runtime state for this question; the console gets an error.
    NoActiveQuestion,
    /// Second answer from the same buzzer, dropped without side effects.
    Duplicate,
    Recorded {
        is_correct: bool,
        points: u32,
        response_time_ms: u64,
    },
}

/// Why a buzz was not added to the pending list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuzzIgnoreReason {
    Excluded,
    AlreadyBuzzed,
    Locked,
}

impl BuzzIgnoreReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excluded => "excluded",
            Self::AlreadyBuzzed => "already buzzed",
            Self::Locked => "buzzers locked",
        }
    }
}

/// Outcome of [`GameSession::record_buzz`].
#[derive(Debug, PartialEq, Eq)]
pub enum BuzzOutcome {
    NoActiveQuestion,
    Ignored(BuzzIgnoreReason),
    Pending {
        response_time_ms: u64,
        /// True when this buzz is the one that should arm the window timer.
        arm_timer: bool,
        epoch: u64,
    },
}

/// Winner elected by an evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuzzDecision {
    pub winner_id: String,
    pub response_time_ms: u64,
}

/// Result of validating the current winner's buzz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBuzz {
    pub points: u32,
    pub response_time_ms: u64,
}

/// Exclusion summary handed to the reopen broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionUpdate {
    pub excluded_players: Vec<String>,
    pub remaining_players: Vec<String>,
}

/// One live game and its players.
#[derive(Debug)]
pub struct GameSession {
    pub id: String,
    pub name: String,
    pub status: GameStatus,
    pub settings: GameSettings,
    /// Ordered question IDs as announced by the console.
    pub question_ids: Vec<u32>,
    /// Index of the question on the floor; `None` until the first dispatch.
    pub current_question_index: Option<usize>,
    pub players: HashMap<String, Player>,
    pub question: Option<QuestionRuntime>,
    epoch_counter: u64,
}

impl GameSession {
    pub fn new(id: String, name: String, question_ids: Vec<u32>) -> Self {
        Self {
            id,
            name,
            status: GameStatus::Created,
            settings: GameSettings::default(),
            question_ids,
            current_question_index: None,
            players: HashMap::new(),
            question: None,
            epoch_counter: 0,
        }
    }

    /// Fetch-or-create the player slot for a buzzer.
    pub fn player_entry(&mut self, buzzer_id: &str, name: &str) -> &mut Player {
        self.players
            .entry(buzzer_id.to_string())
            .or_insert_with(|| Player::new(buzzer_id.to_string(), name.to_string()))
    }

    pub fn rename_player(&mut self, buzzer_id: &str, new_name: &str) {
        if let Some(player) = self.players.get_mut(buzzer_id) {
            player.name = new_name.to_string();
        }
    }

    /// Reset the runtime state for a freshly dispatched question.
    ///
    /// Any armed evaluation timer for the previous question is invalidated
    /// through the epoch bump.
    pub fn start_question(&mut self, question_id: u32, now_ms: u64) {
        let index = match self.question_ids.iter().position(|id| *id == question_id) {
            Some(index) => index,
            None => {
                self.question_ids.push(question_id);
                self.question_ids.len() - 1
            }
        };
        self.current_question_index = Some(index);
        self.epoch_counter += 1;
        self.question = Some(QuestionRuntime::new(question_id, now_ms, self.epoch_counter));
    }

    /// Whether a buzzer already answered the question on the floor.
    pub fn has_answer(&self, question_id: u32, buzzer_id: &str) -> bool {
        self.question
            .as_ref()
            .is_some_and(|runtime| {
                runtime.question_id == question_id && runtime.answers.contains_key(buzzer_id)
            })
    }

    fn runtime_for(&mut self, question_id: u32) -> Option<&mut QuestionRuntime> {
        self.question
            .as_mut()
            .filter(|runtime| runtime.question_id == question_id)
    }

    /// Record an MCQ (or MCQ-path) answer for the current question.
    pub fn record_answer(
        &mut self,
        question: &QuestionEntity,
        buzzer_id: &str,
        player_name: &str,
        answer: &str,
        timestamps: &ClientTimestamps,
        now_ms: u64,
    ) -> AnswerOutcome {
        let Some(runtime) = self.runtime_for(question.id) else {
            return AnswerOutcome::NoActiveQuestion;
        };

        if runtime.answers.contains_key(buzzer_id) {
            return AnswerOutcome::Duplicate;
        }

        let is_correct = match question.kind {
            QuestionKind::Mcq => question.correct_answer.as_deref() == Some(answer),
            // Rapidity questions posted through the answer path: first one wins.
            QuestionKind::Buzzer => runtime.answers.is_empty(),
        };
        let response_time_ms =
            question_relative_ms(timestamps.synced, runtime.started_at_ms, now_ms)
                .min(MAX_ANSWER_RESPONSE_TIME_MS);
        let points = if is_correct {
            question.points.unwrap_or(DEFAULT_QUESTION_POINTS)
        } else {
            0
        };

        runtime.answers.insert(
            buzzer_id.to_string(),
            RecordedAnswer {
                answer: Some(answer.to_string()),
                is_correct,
                points,
                response_time_ms,
            },
        );

        self.player_entry(buzzer_id, player_name)
            .record(is_correct, points, response_time_ms);

        AnswerOutcome::Recorded {
            is_correct,
            points,
            response_time_ms,
        }
    }

    /// Add a buzz to the pending list, or say why it was ignored.
    pub fn record_buzz(
        &mut self,
        question_id: u32,
        buzzer_id: &str,
        player_name: &str,
        timestamps: ClientTimestamps,
        now_ms: u64,
    ) -> BuzzOutcome {
        let Some(runtime) = self.runtime_for(question_id) else {
            return BuzzOutcome::NoActiveQuestion;
        };

        if runtime.excluded.contains(buzzer_id) {
            return BuzzOutcome::Ignored(BuzzIgnoreReason::Excluded);
        }
        if runtime
            .pending_buzzes
            .iter()
            .any(|buzz| !buzz.processed && buzz.buzzer_id == buzzer_id)
        {
            return BuzzOutcome::Ignored(BuzzIgnoreReason::AlreadyBuzzed);
        }
        if runtime.buzzer_locked {
            return BuzzOutcome::Ignored(BuzzIgnoreReason::Locked);
        }

        // No upper clamp here: arbitration compares raw question-relative times.
        let response_time_ms =
            question_relative_ms(timestamps.synced, runtime.started_at_ms, now_ms);
        runtime.pending_buzzes.push(PendingBuzz {
            buzzer_id: buzzer_id.to_string(),
            response_time_ms,
            timestamps,
            received_at_ms: now_ms,
            processed: false,
        });

        let arm_timer = !runtime.evaluation_armed;
        if arm_timer {
            runtime.evaluation_armed = true;
        }
        let epoch = runtime.epoch;

        self.player_entry(buzzer_id, player_name);

        BuzzOutcome::Pending {
            response_time_ms,
            arm_timer,
            epoch,
        }
    }

    /// Elect the lowest-latency pending buzz once the window elapses.
    ///
    /// The `epoch` guard makes a timer armed for an earlier question a no-op.
    pub fn evaluate_buzzes(&mut self, question_id: u32, epoch: u64) -> Option<BuzzDecision> {
        let runtime = self.runtime_for(question_id)?;
        if runtime.epoch != epoch {
            return None;
        }

        runtime.evaluation_armed = false;
        if runtime.buzzer_locked {
            return None;
        }

        let excluded = runtime.excluded.clone();
        let mut winner: Option<(usize, u64)> = None;
        for (index, buzz) in runtime.pending_buzzes.iter().enumerate() {
            if buzz.processed || excluded.contains(&buzz.buzzer_id) {
                continue;
            }
            // Ties resolve to the earliest-received buzz.
            if winner.is_none_or(|(_, best)| buzz.response_time_ms < best) {
                winner = Some((index, buzz.response_time_ms));
            }
        }
        let (winner_index, response_time_ms) = winner?;

        let winner_id = runtime.pending_buzzes[winner_index].buzzer_id.clone();
        for buzz in runtime.pending_buzzes.iter_mut() {
            if !buzz.processed && !excluded.contains(&buzz.buzzer_id) {
                buzz.processed = true;
            }
        }
        runtime.current_winner = Some(winner_id.clone());
        runtime.buzzer_locked = true;

        Some(BuzzDecision {
            winner_id,
            response_time_ms,
        })
    }

    /// Score (or fail) the current winner's buzz and update their stats.
    ///
    /// Either outcome releases the lock: a correct answer resolves the
    /// question, a wrong one is followed by an exclusion and a reopened
    /// floor.
    pub fn validate_buzz(
        &mut self,
        question_id: u32,
        buzzer_id: &str,
        is_correct: bool,
        points_if_correct: u32,
    ) -> Option<ValidatedBuzz> {
        let runtime = self.runtime_for(question_id)?;
        let response_time_ms = runtime
            .pending_buzzes
            .iter()
            .rev()
            .find(|buzz| buzz.buzzer_id == buzzer_id)
            .map(|buzz| buzz.response_time_ms)?;

        runtime.buzzer_locked = false;
        runtime.current_winner = None;

        let points = if is_correct { points_if_correct } else { 0 };
        let name = self
            .players
            .get(buzzer_id)
            .map(|player| player.name.clone())
            .unwrap_or_else(|| buzzer_id.to_string());
        self.player_entry(buzzer_id, &name)
            .record(is_correct, points, response_time_ms);

        Some(ValidatedBuzz {
            points,
            response_time_ms,
        })
    }

    /// Bar a player from re-buzzing and reopen the floor for the others.
    pub fn exclude_player(&mut self, question_id: u32, buzzer_id: &str) -> Option<ExclusionUpdate> {
        let runtime = self.runtime_for(question_id)?;
        runtime.excluded.insert(buzzer_id.to_string());
        runtime.buzzer_locked = false;
        runtime.current_winner = None;

        let mut excluded_players: Vec<String> = runtime.excluded.iter().cloned().collect();
        excluded_players.sort();
        let mut remaining_players: Vec<String> = self
            .players
            .keys()
            .filter(|id| !excluded_players.contains(id))
            .cloned()
            .collect();
        remaining_players.sort();

        Some(ExclusionUpdate {
            excluded_players,
            remaining_players,
        })
    }
}

/// Question-relative response time: synced client timestamp when present,
/// server receive time otherwise. Negative offsets floor to zero.
fn question_relative_ms(synced: Option<u64>, started_at_ms: u64, now_ms: u64) -> u64 {
    synced.unwrap_or(now_ms).saturating_sub(started_at_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mcq_question(id: u32) -> QuestionEntity {
        QuestionEntity {
            id,
            text: "Capital of France?".into(),
            kind: QuestionKind::Mcq,
            category: None,
            points: Some(20),
            answers: Some(r#"["Paris","Lyon"]"#.into()),
            correct_answer: Some("Paris".into()),
        }
    }

    fn buzzer_question(id: u32) -> QuestionEntity {
        QuestionEntity {
            id,
            text: "Buzz!".into(),
            kind: QuestionKind::Buzzer,
            category: None,
            points: None,
            answers: None,
            correct_answer: None,
        }
    }

    fn synced(at_ms: u64) -> ClientTimestamps {
        ClientTimestamps {
            local: Some(at_ms),
            synced: Some(at_ms),
            calibrated_latency: None,
        }
    }

    fn game_with_question(question_id: u32, started_at_ms: u64) -> GameSession {
        let mut game = GameSession::new("g1".into(), "Friday quiz".into(), vec![question_id]);
        game.status = GameStatus::Started;
        game.start_question(question_id, started_at_ms);
        game
    }

    #[test]
    fn duplicate_answer_is_dropped_without_mutation() {
        let mut game = game_with_question(42, 1_000);
        let question = mcq_question(42);

        let first = game.record_answer(&question, "b1", "Alice", "Paris", &synced(1_300), 1_400);
        assert_eq!(
            first,
            AnswerOutcome::Recorded {
                is_correct: true,
                points: 20,
                response_time_ms: 300
            }
        );

        let second = game.record_answer(&question, "b1", "Alice", "Lyon", &synced(1_500), 1_600);
        assert_eq!(second, AnswerOutcome::Duplicate);

        let player = &game.players["b1"];
        assert_eq!(player.total_answers, 1);
        assert_eq!(player.correct_answers, 1);
        assert_eq!(player.score, 20);
    }

    #[test]
    fn wrong_answer_scores_zero_but_counts() {
        let mut game = game_with_question(42, 1_000);
        let outcome =
            game.record_answer(&mcq_question(42), "b2", "Bob", "Lyon", &synced(1_250), 1_300);
        assert_eq!(
            outcome,
            AnswerOutcome::Recorded {
                is_correct: false,
                points: 0,
                response_time_ms: 250
            }
        );
        let player = &game.players["b2"];
        assert_eq!(player.correct_answers, 0);
        assert_eq!(player.total_answers, 1);
        assert!(player.correct_answers <= player.total_answers);
    }

    #[test]
    fn buzzer_question_first_answer_wins_second_does_not() {
        let mut game = game_with_question(50, 0);
        let question = buzzer_question(50);

        let first = game.record_answer(&question, "b1", "Alice", "", &synced(400), 450);
        let second = game.record_answer(&question, "b2", "Bob", "", &synced(380), 450);

        assert!(matches!(
            first,
            AnswerOutcome::Recorded {
                is_correct: true,
                points: DEFAULT_QUESTION_POINTS,
                ..
            }
        ));
        assert!(matches!(
            second,
            AnswerOutcome::Recorded {
                is_correct: false, ..
            }
        ));
    }

    #[test]
    fn answer_response_time_is_clamped_to_two_minutes() {
        let mut game = game_with_question(42, 1_000);
        let outcome = game.record_answer(
            &mcq_question(42),
            "b1",
            "Alice",
            "Paris",
            &synced(500_000),
            500_100,
        );
        assert!(matches!(
            outcome,
            AnswerOutcome::Recorded {
                response_time_ms: MAX_ANSWER_RESPONSE_TIME_MS,
                ..
            }
        ));

        // A synced timestamp before the question start floors at zero.
        game.start_question(42, 10_000);
        let outcome =
            game.record_answer(&mcq_question(42), "b1", "Alice", "Paris", &synced(9_000), 10_050);
        assert!(matches!(
            outcome,
            AnswerOutcome::Recorded {
                response_time_ms: 0,
                ..
            }
        ));
    }

    #[test]
    fn answer_without_active_question_is_an_error() {
        let mut game = GameSession::new("g1".into(), "q".into(), vec![42]);
        let outcome =
            game.record_answer(&mcq_question(42), "b1", "Alice", "Paris", &synced(100), 200);
        assert_eq!(outcome, AnswerOutcome::NoActiveQuestion);
    }

    #[test]
    fn first_buzz_arms_the_timer_followers_do_not() {
        let mut game = game_with_question(42, 0);

        let first = game.record_buzz(42, "b1", "b1", synced(520), 560);
        let second = game.record_buzz(42, "b2", "b2", synced(505), 561);

        assert!(matches!(
            first,
            BuzzOutcome::Pending {
                arm_timer: true,
                response_time_ms: 520,
                ..
            }
        ));
        assert!(matches!(
            second,
            BuzzOutcome::Pending {
                arm_timer: false,
                response_time_ms: 505,
                ..
            }
        ));
    }

    #[test]
    fn buzz_response_time_is_not_upper_clamped() {
        let mut game = game_with_question(42, 0);
        let outcome = game.record_buzz(42, "b1", "b1", synced(500_000), 500_000);
        assert!(matches!(
            outcome,
            BuzzOutcome::Pending {
                response_time_ms: 500_000,
                ..
            }
        ));
    }

    #[test]
    fn simultaneous_buzzes_elect_lowest_latency() {
        let mut game = game_with_question(42, 0);
        game.player_entry("b1", "Alice");
        game.player_entry("b2", "Bob");
        game.player_entry("b3", "Carol");

        let epoch = match game.record_buzz(42, "b1", "b1", synced(520), 540) {
            BuzzOutcome::Pending { epoch, .. } => epoch,
            other => panic!("unexpected outcome: {other:?}"),
        };
        game.record_buzz(42, "b2", "b2", synced(505), 545);
        game.record_buzz(42, "b3", "b3", synced(540), 550);

        let decision = game.evaluate_buzzes(42, epoch).unwrap();
        assert_eq!(decision.winner_id, "b2");
        assert_eq!(decision.response_time_ms, 505);

        let runtime = game.question.as_ref().unwrap();
        assert!(runtime.buzzer_locked);
        assert_eq!(runtime.current_winner.as_deref(), Some("b2"));
        assert!(runtime.pending_buzzes.iter().all(|buzz| buzz.processed));

        // Buzzes arriving after the lock are turned away.
        assert_eq!(
            game.record_buzz(42, "b1", "b1", synced(700), 710),
            BuzzOutcome::Ignored(BuzzIgnoreReason::Locked)
        );
    }

    #[test]
    fn evaluation_with_stale_epoch_is_a_no_op() {
        let mut game = game_with_question(42, 0);
        let epoch = match game.record_buzz(42, "b1", "b1", synced(300), 320) {
            BuzzOutcome::Pending { epoch, .. } => epoch,
            other => panic!("unexpected outcome: {other:?}"),
        };

        // The console moves on before the window fires.
        game.start_question(42, 5_000);
        assert!(game.evaluate_buzzes(42, epoch).is_none());
        assert!(!game.question.as_ref().unwrap().buzzer_locked);
    }

    #[test]
    fn second_evaluation_after_lock_decides_nothing() {
        let mut game = game_with_question(42, 0);
        let epoch = match game.record_buzz(42, "b1", "b1", synced(300), 320) {
            BuzzOutcome::Pending { epoch, .. } => epoch,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert!(game.evaluate_buzzes(42, epoch).is_some());
        assert!(game.evaluate_buzzes(42, epoch).is_none());
    }

    #[test]
    fn duplicate_pending_buzz_is_ignored() {
        let mut game = game_with_question(42, 0);
        game.record_buzz(42, "b1", "b1", synced(300), 320);
        assert_eq!(
            game.record_buzz(42, "b1", "b1", synced(310), 330),
            BuzzOutcome::Ignored(BuzzIgnoreReason::AlreadyBuzzed)
        );
    }

    #[test]
    fn reopen_flow_excludes_winner_and_allows_new_window() {
        let mut game = game_with_question(42, 0);
        game.player_entry("b1", "Alice");
        game.player_entry("b2", "Bob");
        game.player_entry("b3", "Carol");

        let epoch = match game.record_buzz(42, "b2", "b2", synced(505), 520) {
            BuzzOutcome::Pending { epoch, .. } => epoch,
            other => panic!("unexpected outcome: {other:?}"),
        };
        game.record_buzz(42, "b1", "b1", synced(520), 525);
        game.evaluate_buzzes(42, epoch).unwrap();

        // Console declares the winner wrong.
        game.validate_buzz(42, "b2", false, 0).unwrap();
        let update = game.exclude_player(42, "b2").unwrap();
        assert_eq!(update.excluded_players, vec!["b2".to_string()]);
        assert_eq!(
            update.remaining_players,
            vec!["b1".to_string(), "b3".to_string()]
        );

        let runtime = game.question.as_ref().unwrap();
        assert!(!runtime.buzzer_locked);
        assert!(runtime.current_winner.is_none());

        // The excluded player stays out; another buzz opens a fresh window.
        assert_eq!(
            game.record_buzz(42, "b2", "b2", synced(900), 910),
            BuzzOutcome::Ignored(BuzzIgnoreReason::Excluded)
        );
        let outcome = game.record_buzz(42, "b1", "b1", synced(1_000), 1_010);
        let epoch = match outcome {
            BuzzOutcome::Pending {
                arm_timer: true,
                epoch,
                ..
            } => epoch,
            other => panic!("expected re-armed window, got {other:?}"),
        };
        let decision = game.evaluate_buzzes(42, epoch).unwrap();
        assert_eq!(decision.winner_id, "b1");
    }

    #[test]
    fn validate_buzz_scores_winner_and_updates_stats() {
        let mut game = game_with_question(42, 0);
        game.player_entry("b1", "Alice");

        let epoch = match game.record_buzz(42, "b1", "b1", synced(305), 320) {
            BuzzOutcome::Pending { epoch, .. } => epoch,
            other => panic!("unexpected outcome: {other:?}"),
        };
        game.evaluate_buzzes(42, epoch).unwrap();

        let validated = game.validate_buzz(42, "b1", true, 20).unwrap();
        assert_eq!(
            validated,
            ValidatedBuzz {
                points: 20,
                response_time_ms: 305
            }
        );
        let player = &game.players["b1"];
        assert_eq!(player.score, 20);
        assert_eq!(player.correct_answers, 1);
        assert_eq!(player.fastest_response_ms, Some(305));

        // Validation resolves the question, so the lock is gone and the
        // floor accepts buzzes again.
        let runtime = game.question.as_ref().unwrap();
        assert!(!runtime.buzzer_locked);
        assert!(runtime.current_winner.is_none());
        assert!(matches!(
            game.record_buzz(42, "b2", "b2", synced(900), 910),
            BuzzOutcome::Pending {
                arm_timer: true,
                ..
            }
        ));
    }

    #[test]
    fn question_dispatch_resets_runtime_state() {
        let mut game = game_with_question(42, 0);
        game.record_buzz(42, "b1", "b1", synced(300), 320);
        game.record_answer(&mcq_question(42), "b2", "Bob", "Lyon", &synced(200), 250);

        game.start_question(43, 10_000);
        let runtime = game.question.as_ref().unwrap();
        assert_eq!(runtime.question_id, 43);
        assert_eq!(runtime.started_at_ms, 10_000);
        assert!(runtime.answers.is_empty());
        assert!(runtime.pending_buzzes.is_empty());
        assert!(runtime.excluded.is_empty());
        assert!(!runtime.buzzer_locked);
        assert_eq!(game.current_question_index, Some(1));
    }
}
