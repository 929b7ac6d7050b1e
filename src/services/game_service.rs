//! Game bootstrap, question dispatch, and the MCQ answer path.

use tracing::{debug, info, warn};

use crate::{
    dao::models::{AnswerRecordEntity, QuestionKind},
    dto::ws::{ClientTimestamps, ServerMessage},
    error::ServiceError,
    services::broadcast,
    state::{
        AppState, SharedState,
        game::{AnswerOutcome, DEFAULT_QUESTION_POINTS, GameSession, GameStatus},
    },
};

/// Build the `BUZZER_LIST_UPDATE` payload from the registry snapshot.
pub fn buzzer_list_message(state: &AppState) -> ServerMessage {
    let buzzers: Vec<_> = state
        .registry()
        .buzzers_snapshot()
        .iter()
        .map(|peer| peer.info())
        .collect();
    ServerMessage::BuzzerListUpdate {
        total: buzzers.len(),
        buzzers,
    }
}

/// Create (or replace) the in-memory session for a game and tell the buzzers.
pub async fn start_game(state: &SharedState, game_id: String, name: String, total_questions: u32) {
    let question_ids = match state.question_store().game_questions(&game_id).await {
        Ok(ids) => ids,
        Err(err) => {
            warn!(game_id, error = %err, "failed to load question order");
            Vec::new()
        }
    };

    let mut game = GameSession::new(game_id.clone(), name.clone(), question_ids);
    game.status = GameStatus::Started;
    state.insert_game(game);
    info!(game_id, total_questions, "game started");

    broadcast::broadcast_to_buzzers(
        state,
        ServerMessage::GameStarted {
            game_id,
            name,
            total_questions,
        },
    );
}

/// Dispatch a question: reset the runtime state, fan `QUESTION_START` out to
/// every buzzer, and confirm to the console.
pub async fn send_question(
    state: &SharedState,
    game_id: &str,
    question_id: u32,
) -> Result<(), ServiceError> {
    let question = state
        .question_store()
        .find_question(question_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("question `{question_id}` not found")))?;

    let now = state.now_ms();
    state
        .with_game_mut(game_id, |game| game.start_question(question_id, now))
        .ok_or_else(|| ServiceError::NotFound(format!("game `{game_id}` not found")))?;

    let is_mcq = question.kind == QuestionKind::Mcq;
    let message = ServerMessage::QuestionStart {
        game_id: game_id.to_string(),
        id: question.id,
        text: question.text.clone(),
        kind: question.kind,
        category: question.category.clone(),
        points: question.points.unwrap_or(DEFAULT_QUESTION_POINTS),
        start_time: now,
        answers: if is_mcq {
            decode_answers(question.answers.as_deref())
        } else {
            None
        },
        correct_answer: if is_mcq {
            question.correct_answer.clone()
        } else {
            None
        },
    };

    let sent_to = broadcast::broadcast_to_buzzers(state, message);
    debug!(game_id, question_id, sent_to, "question dispatched");
    broadcast::send_to_console(
        state,
        ServerMessage::QuestionSent {
            question_id,
            sent_to,
            timestamp: now,
        },
    );
    Ok(())
}

/// Record an answer frame from a buzzer and report the outcome both ways.
pub async fn record_answer(
    state: &SharedState,
    buzzer_id: &str,
    game_id: &str,
    question_id: u32,
    answer: String,
    timestamps: ClientTimestamps,
) -> Result<(), ServiceError> {
    // Duplicates short-circuit before any catalog lookup.
    let duplicate = state
        .with_game_mut(game_id, |game| game.has_answer(question_id, buzzer_id))
        .ok_or_else(|| ServiceError::NotFound(format!("game `{game_id}` not found")))?;
    if duplicate {
        debug!(buzzer_id, question_id, "duplicate answer dropped");
        return Ok(());
    }

    let question = state
        .question_store()
        .find_question(question_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("question `{question_id}` not found")))?;

    let player_name = state
        .registry()
        .buzzer(buzzer_id)
        .map(|peer| peer.name())
        .unwrap_or_else(|| buzzer_id.to_string());

    let now = state.now_ms();
    let outcome = state
        .with_game_mut(game_id, |game| {
            game.record_answer(&question, buzzer_id, &player_name, &answer, &timestamps, now)
        })
        .ok_or_else(|| ServiceError::NotFound(format!("game `{game_id}` not found")))?;

    match outcome {
        AnswerOutcome::NoActiveQuestion => Err(ServiceError::InvalidState(format!(
            "question `{question_id}` is not on the floor"
        ))),
        AnswerOutcome::Duplicate => {
            debug!(buzzer_id, question_id, "duplicate answer dropped");
            Ok(())
        }
        AnswerOutcome::Recorded {
            is_correct,
            points,
            response_time_ms,
        } => {
            persist_answer(
                state,
                game_id,
                question_id,
                buzzer_id,
                &player_name,
                Some(answer.clone()),
                is_correct,
                points,
                response_time_ms,
            )
            .await;

            broadcast::send_to_buzzer(
                state,
                buzzer_id,
                ServerMessage::AnswerResult {
                    question_id,
                    is_correct,
                    points,
                    response_time: response_time_ms,
                },
            );
            broadcast::send_to_console(
                state,
                ServerMessage::AnswerReceived {
                    buzzer_id: buzzer_id.to_string(),
                    question_id,
                    answer,
                    is_correct,
                    points,
                    response_time: response_time_ms,
                    timestamps,
                },
            );
            Ok(())
        }
    }
}

/// Rename a buzzer's player everywhere and notify both sides.
pub async fn rename_player(
    state: &SharedState,
    buzzer_id: &str,
    new_name: &str,
) -> Result<(), ServiceError> {
    if new_name.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "player name must not be empty".into(),
        ));
    }

    let peer = state
        .registry()
        .buzzer(buzzer_id)
        .ok_or_else(|| ServiceError::NotFound(format!("buzzer `{buzzer_id}` not connected")))?;

    peer.set_name(new_name.to_string());
    state.rename_player(buzzer_id, new_name);

    broadcast::send_to_buzzer(
        state,
        buzzer_id,
        ServerMessage::PlayerNameUpdate {
            name: new_name.to_string(),
        },
    );
    broadcast::send_to_console(state, buzzer_list_message(state));
    Ok(())
}

/// Write one result row, logging (not propagating) failures.
#[allow(clippy::too_many_arguments)]
pub async fn persist_answer(
    state: &SharedState,
    game_id: &str,
    question_id: u32,
    buzzer_id: &str,
    player_name: &str,
    answer: Option<String>,
    is_correct: bool,
    points: u32,
    response_time_ms: u64,
) {
    let row = AnswerRecordEntity {
        game_id: game_id.to_string(),
        question_id,
        buzzer_id: buzzer_id.to_string(),
        player_name: player_name.to_string(),
        answer,
        is_correct,
        points,
        response_time_ms,
        recorded_at_ms: state.now_ms(),
    };
    if let Err(err) = state.result_writer().record_answer(row).await {
        warn!(game_id, buzzer_id, error = %err, "failed to persist answer result");
    }
}

fn decode_answers(stored: Option<&str>) -> Option<Vec<String>> {
    let raw = stored?;
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(answers) => Some(answers),
        Err(err) => {
            warn!(error = %err, "stored answers are not a JSON array");
            None
        }
    }
}
