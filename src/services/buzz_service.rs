//! Buzz arbitration: collect concurrent buzzes for one simultaneity window,
//! then elect the lowest-latency device as winner.
//!
//! The first eligible buzz arms a single-shot timer; when it fires the
//! decision is taken in one pass over the pending list, so the outcome
//! depends only on each buzz's question-relative response time, never on
//! frame arrival order.

use tracing::{debug, info, warn};

use crate::{
    dto::ws::{ClientTimestamps, ServerMessage},
    error::ServiceError,
    services::{broadcast, game_service},
    state::{
        SharedState,
        game::{BuzzOutcome, DEFAULT_QUESTION_POINTS},
    },
};

/// Handle an `ANSWER_BUZZER` frame from a device.
pub async fn record_buzz(
    state: &SharedState,
    buzzer_id: &str,
    game_id: &str,
    question_id: u32,
    timestamps: ClientTimestamps,
) -> Result<(), ServiceError> {
    let player_name = state
        .registry()
        .buzzer(buzzer_id)
        .map(|peer| peer.name())
        .unwrap_or_else(|| buzzer_id.to_string());

    let now = state.now_ms();
    let outcome = state
        .with_game_mut(game_id, |game| {
            game.record_buzz(question_id, buzzer_id, &player_name, timestamps, now)
        })
        .ok_or_else(|| ServiceError::NotFound(format!("game `{game_id}` not found")))?;

    match outcome {
        BuzzOutcome::NoActiveQuestion => Err(ServiceError::InvalidState(format!(
            "question `{question_id}` is not on the floor"
        ))),
        BuzzOutcome::Ignored(reason) => {
            debug!(buzzer_id, reason = reason.as_str(), "buzz ignored");
            broadcast::send_to_buzzer(
                state,
                buzzer_id,
                ServerMessage::BuzzIgnored {
                    reason: reason.as_str().to_string(),
                },
            );
            Ok(())
        }
        BuzzOutcome::Pending {
            response_time_ms,
            arm_timer,
            epoch,
        } => {
            debug!(buzzer_id, response_time_ms, "buzz pending");
            if arm_timer {
                let state = state.clone();
                let game_id = game_id.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(state.config().buzz_window).await;
                    evaluate_buzzes(&state, &game_id, question_id, epoch);
                });
            }
            Ok(())
        }
    }
}

/// Timer body: decide the winner and publish the result.
///
/// Guarded by the question epoch so a window armed for a superseded
/// question decides nothing.
pub fn evaluate_buzzes(state: &SharedState, game_id: &str, question_id: u32, epoch: u64) {
    let decision = state
        .with_game_mut(game_id, |game| game.evaluate_buzzes(question_id, epoch))
        .flatten();
    let Some(decision) = decision else {
        return;
    };

    let player_name = state
        .with_game_mut(game_id, |game| {
            game.players
                .get(&decision.winner_id)
                .map(|player| player.name.clone())
        })
        .flatten()
        .or_else(|| {
            state
                .registry()
                .buzzer(&decision.winner_id)
                .map(|peer| peer.name())
        })
        .unwrap_or_else(|| decision.winner_id.clone());

    info!(
        game_id,
        question_id,
        winner = %decision.winner_id,
        response_time_ms = decision.response_time_ms,
        "buzz winner elected"
    );

    broadcast::broadcast_to_buzzers(
        state,
        ServerMessage::BuzzerLocked {
            game_id: game_id.to_string(),
            question_id,
            winner_id: decision.winner_id.clone(),
        },
    );
    broadcast::send_to_console(
        state,
        ServerMessage::BuzzWinner {
            buzzer_id: decision.winner_id,
            player_name,
            question_id,
            game_id: game_id.to_string(),
            response_time: decision.response_time_ms,
        },
    );
}

/// Console accepted the winner's spoken answer (`BUZZ_CORRECT`).
pub async fn validate_correct(
    state: &SharedState,
    game_id: &str,
    question_id: u32,
    buzzer_id: &str,
) -> Result<(), ServiceError> {
    let question = match state.question_store().find_question(question_id).await {
        Ok(question) => question,
        Err(err) => {
            warn!(question_id, error = %err, "question lookup failed during validation");
            None
        }
    };
    let points = question
        .as_ref()
        .and_then(|question| question.points)
        .unwrap_or(DEFAULT_QUESTION_POINTS);

    let validated = state
        .with_game_mut(game_id, |game| {
            game.validate_buzz(question_id, buzzer_id, true, points)
        })
        .flatten()
        .ok_or_else(|| {
            ServiceError::NotFound(format!("no pending buzz from `{buzzer_id}` to validate"))
        })?;

    let player_name = state
        .registry()
        .buzzer(buzzer_id)
        .map(|peer| peer.name())
        .unwrap_or_else(|| buzzer_id.to_string());
    game_service::persist_answer(
        state,
        game_id,
        question_id,
        buzzer_id,
        &player_name,
        None,
        true,
        validated.points,
        validated.response_time_ms,
    )
    .await;

    broadcast::send_to_buzzer(
        state,
        buzzer_id,
        ServerMessage::AnswerResult {
            question_id,
            is_correct: true,
            points: validated.points,
            response_time: validated.response_time_ms,
        },
    );
    broadcast::send_to_console(
        state,
        ServerMessage::BuzzValidated {
            buzzer_id: buzzer_id.to_string(),
            is_correct: true,
            points: validated.points,
            response_time: validated.response_time_ms,
        },
    );
    // The question is resolved; release everyone.
    broadcast::broadcast_to_buzzers(
        state,
        ServerMessage::BuzzerUnlocked {
            game_id: game_id.to_string(),
            question_id,
        },
    );
    Ok(())
}

/// Console rejected the winner's answer (`BUZZ_REOPEN`): exclude them and
/// reopen the floor for the rest.
pub async fn reopen(
    state: &SharedState,
    game_id: &str,
    question_id: u32,
    buzzer_id: &str,
) -> Result<(), ServiceError> {
    let update = state
        .with_game_mut(game_id, |game| {
            // A failed validation still counts against the player's stats.
            game.validate_buzz(question_id, buzzer_id, false, 0);
            game.exclude_player(question_id, buzzer_id)
        })
        .flatten()
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "game `{game_id}` has no question `{question_id}` to reopen"
            ))
        })?;

    info!(game_id, question_id, excluded = %buzzer_id, "buzz reopened");

    for peer in state.registry().buzzers_snapshot() {
        let message = if update.excluded_players.contains(&peer.id) {
            ServerMessage::BuzzerExcluded {
                game_id: game_id.to_string(),
                question_id,
                reason: Some("answered incorrectly".to_string()),
            }
        } else {
            ServerMessage::BuzzerUnlocked {
                game_id: game_id.to_string(),
                question_id,
            }
        };
        broadcast::send_to_buzzer(state, &peer.id, message);
    }

    broadcast::send_to_console(
        state,
        ServerMessage::BuzzReopened {
            excluded_players: update.excluded_players,
            remaining_players: update.remaining_players,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::clock::Clock;
    use crate::test_support::{
        TestHarness, TestStateBuilder, buzzer_question, connect_buzzer, connect_console,
        drain_server_messages, synced,
    };
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    async fn harness_with_running_question() -> (
        TestHarness,
        mpsc::UnboundedReceiver<Message>,
        Vec<mpsc::UnboundedReceiver<Message>>,
    ) {
        let harness = TestStateBuilder::new()
            .question(buzzer_question(42))
            .game("g1", vec![42])
            .build_harness();
        let state = harness.state.clone();
        let mut console_rx = connect_console(&state);
        let mut buzzer_rxs = Vec::new();
        for id in ["b1", "b2", "b3"] {
            let (_peer, rx) = connect_buzzer(&state, id);
            buzzer_rxs.push(rx);
        }

        game_service::start_game(&state, "g1".into(), "quiz".into(), 1).await;
        game_service::send_question(&state, "g1", 42).await.unwrap();
        drain_server_messages(&mut console_rx);
        for rx in buzzer_rxs.iter_mut() {
            drain_server_messages(rx);
        }
        (harness, console_rx, buzzer_rxs)
    }

    #[tokio::test(start_paused = true)]
    async fn single_buzz_wins_after_the_window() {
        let (harness, mut console_rx, mut buzzer_rxs) = harness_with_running_question().await;
        let state = harness.state.clone();
        let question_start = harness.clock.now_ms();

        harness.clock.advance(300);
        record_buzz(&state, "b1", "g1", 42, synced(question_start + 300)).await.unwrap();

        // Nothing is decided before the 200 ms window elapses.
        assert!(drain_server_messages(&mut console_rx).is_empty());

        tokio::time::sleep(Duration::from_millis(250)).await;

        let console_messages = drain_server_messages(&mut console_rx);
        assert!(console_messages.iter().any(|message| matches!(
            message,
            ServerMessage::BuzzWinner {
                buzzer_id,
                response_time: 300,
                ..
            } if buzzer_id == "b1"
        )));
        for rx in buzzer_rxs.iter_mut() {
            let messages = drain_server_messages(rx);
            assert!(messages.iter().any(|message| matches!(
                message,
                ServerMessage::BuzzerLocked { winner_id, .. } if winner_id == "b1"
            )));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn simultaneous_buzzes_elect_fastest_not_first() {
        let (harness, mut console_rx, mut buzzer_rxs) = harness_with_running_question().await;
        let state = harness.state.clone();
        let question_start = harness.clock.now_ms();

        harness.clock.advance(550);
        // Arrival order b1, b2, b3; synced response times 520, 505, 540.
        record_buzz(&state, "b1", "g1", 42, synced(question_start + 520)).await.unwrap();
        record_buzz(&state, "b2", "g1", 42, synced(question_start + 505)).await.unwrap();
        record_buzz(&state, "b3", "g1", 42, synced(question_start + 540)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;

        let console_messages = drain_server_messages(&mut console_rx);
        let winners: Vec<_> = console_messages
            .iter()
            .filter_map(|message| match message {
                ServerMessage::BuzzWinner {
                    buzzer_id,
                    response_time,
                    ..
                } => Some((buzzer_id.clone(), *response_time)),
                _ => None,
            })
            .collect();
        assert_eq!(winners, vec![("b2".to_string(), 505)]);

        for rx in buzzer_rxs.iter_mut() {
            let messages = drain_server_messages(rx);
            assert_eq!(
                messages
                    .iter()
                    .filter(|message| matches!(message, ServerMessage::BuzzerLocked { .. }))
                    .count(),
                1
            );
        }

        let all_processed = state
            .with_game_mut("g1", |game| {
                game.question
                    .as_ref()
                    .unwrap()
                    .pending_buzzes
                    .iter()
                    .all(|buzz| buzz.processed)
            })
            .unwrap();
        assert!(all_processed);
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_excludes_winner_and_new_window_elects_again() {
        let (harness, mut console_rx, mut buzzer_rxs) = harness_with_running_question().await;
        let state = harness.state.clone();
        let question_start = harness.clock.now_ms();

        harness.clock.advance(550);
        record_buzz(&state, "b2", "g1", 42, synced(question_start + 505)).await.unwrap();
        record_buzz(&state, "b1", "g1", 42, synced(question_start + 520)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        drain_server_messages(&mut console_rx);
        for rx in buzzer_rxs.iter_mut() {
            drain_server_messages(rx);
        }

        reopen(&state, "g1", 42, "b2").await.unwrap();

        let console_messages = drain_server_messages(&mut console_rx);
        assert!(console_messages.iter().any(|message| matches!(
            message,
            ServerMessage::BuzzReopened {
                excluded_players, ..
            } if excluded_players == &["b2".to_string()]
        )));
        // b2 is told it is out, the others are unlocked.
        assert!(matches!(
            drain_server_messages(&mut buzzer_rxs[1]).as_slice(),
            [ServerMessage::BuzzerExcluded { .. }]
        ));
        for index in [0, 2] {
            assert!(matches!(
                drain_server_messages(&mut buzzer_rxs[index]).as_slice(),
                [ServerMessage::BuzzerUnlocked { .. }]
            ));
        }

        // b2 can no longer buzz; b1 opens a fresh window and wins it.
        harness.clock.advance(450);
        let now = harness.clock.now_ms();
        record_buzz(&state, "b2", "g1", 42, synced(now)).await.unwrap();
        assert!(matches!(
            drain_server_messages(&mut buzzer_rxs[1]).as_slice(),
            [ServerMessage::BuzzIgnored { reason }] if reason == "excluded"
        ));

        record_buzz(&state, "b1", "g1", 42, synced(now)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        let console_messages = drain_server_messages(&mut console_rx);
        assert!(console_messages.iter().any(|message| matches!(
            message,
            ServerMessage::BuzzWinner { buzzer_id, .. } if buzzer_id == "b1"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn validate_flow_scores_persists_and_unlocks() {
        let (harness, mut console_rx, mut buzzer_rxs) = harness_with_running_question().await;
        let state = harness.state.clone();
        let question_start = harness.clock.now_ms();

        harness.clock.advance(320);
        record_buzz(&state, "b1", "g1", 42, synced(question_start + 305)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        drain_server_messages(&mut console_rx);
        for rx in buzzer_rxs.iter_mut() {
            drain_server_messages(rx);
        }

        validate_correct(&state, "g1", 42, "b1").await.unwrap();

        assert!(matches!(
            drain_server_messages(&mut buzzer_rxs[0]).as_slice(),
            [
                ServerMessage::AnswerResult {
                    is_correct: true,
                    points: DEFAULT_QUESTION_POINTS,
                    response_time: 305,
                    ..
                },
                ServerMessage::BuzzerUnlocked { .. }
            ]
        ));
        let console_messages = drain_server_messages(&mut console_rx);
        assert!(console_messages.iter().any(|message| matches!(
            message,
            ServerMessage::BuzzValidated {
                buzzer_id,
                points: DEFAULT_QUESTION_POINTS,
                ..
            } if buzzer_id == "b1"
        )));

        let rows = harness.results.rows();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_correct);
        assert_eq!(rows[0].response_time_ms, 305);

        let score = state
            .with_game_mut("g1", |game| game.players["b1"].score)
            .unwrap();
        assert_eq!(score, i64::from(DEFAULT_QUESTION_POINTS));

        // The runtime really unlocked, not just the broadcast: a fresh buzz
        // arms a new window and elects a new winner.
        harness.clock.advance(500);
        let now = harness.clock.now_ms();
        record_buzz(&state, "b2", "g1", 42, synced(now)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        let console_messages = drain_server_messages(&mut console_rx);
        assert!(console_messages.iter().any(|message| matches!(
            message,
            ServerMessage::BuzzWinner { buzzer_id, .. } if buzzer_id == "b2"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn window_armed_for_a_previous_question_decides_nothing() {
        let (harness, mut console_rx, _buzzer_rxs) = harness_with_running_question().await;
        let state = harness.state.clone();

        record_buzz(&state, "b1", "g1", 42, synced(harness.clock.now_ms())).await.unwrap();
        // The console re-dispatches before the window fires.
        game_service::send_question(&state, "g1", 42).await.unwrap();
        drain_server_messages(&mut console_rx);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let console_messages = drain_server_messages(&mut console_rx);
        assert!(!console_messages
            .iter()
            .any(|message| matches!(message, ServerMessage::BuzzWinner { .. })));
    }
}
