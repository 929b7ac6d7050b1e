//! Shared fixtures for unit tests: a static catalog, a capturing results
//! writer, and channel-backed peers that stand in for real sockets.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::extract::ws::Message;
use futures::{FutureExt, future::BoxFuture};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    clock::ManualClock,
    config::AppConfig,
    dao::{
        JingleStore, QuestionStore, ResultWriter, StorageResult,
        models::{AnswerRecordEntity, JingleEntity, QuestionEntity, QuestionKind},
    },
    dto::ws::{ClientTimestamps, Envelope, ServerMessage},
    state::{
        AppState, SharedState,
        registry::{BuzzerPeer, ConsolePeer, RegisterOutcome},
    },
};

/// Catalog fixture serving from in-memory maps.
pub struct StaticCatalog {
    questions: HashMap<u32, QuestionEntity>,
    games: HashMap<String, Vec<u32>>,
    jingles: HashMap<u32, JingleEntity>,
}

impl QuestionStore for StaticCatalog {
    fn find_question(&self, id: u32) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let question = self.questions.get(&id).cloned();
        async move { Ok(question) }.boxed()
    }

    fn game_questions(&self, game_id: &str) -> BoxFuture<'static, StorageResult<Vec<u32>>> {
        let ids = self.games.get(game_id).cloned().unwrap_or_default();
        async move { Ok(ids) }.boxed()
    }
}

impl JingleStore for StaticCatalog {
    fn find_jingle(&self, id: u32) -> BoxFuture<'static, StorageResult<Option<JingleEntity>>> {
        let jingle = self.jingles.get(&id).cloned();
        async move { Ok(jingle) }.boxed()
    }
}

/// Results writer that stores rows for assertions.
#[derive(Default)]
pub struct CapturingResultWriter {
    rows: Mutex<Vec<AnswerRecordEntity>>,
}

impl CapturingResultWriter {
    pub fn rows(&self) -> Vec<AnswerRecordEntity> {
        self.rows.lock().unwrap().clone()
    }
}

impl ResultWriter for CapturingResultWriter {
    fn record_answer(&self, row: AnswerRecordEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.rows.lock().unwrap().push(row);
        async { Ok(()) }.boxed()
    }
}

/// Everything a service test needs to drive the core.
pub struct TestHarness {
    pub state: SharedState,
    pub clock: Arc<ManualClock>,
    pub results: Arc<CapturingResultWriter>,
}

/// Builder for [`TestHarness`] with a small default catalog.
pub struct TestStateBuilder {
    questions: Vec<QuestionEntity>,
    games: HashMap<String, Vec<u32>>,
    jingles: Vec<JingleEntity>,
    config: AppConfig,
    start_ms: u64,
}

impl TestStateBuilder {
    pub fn new() -> Self {
        Self {
            questions: Vec::new(),
            games: HashMap::new(),
            jingles: Vec::new(),
            config: AppConfig::default(),
            start_ms: 1_000_000,
        }
    }

    pub fn question(mut self, question: QuestionEntity) -> Self {
        self.questions.push(question);
        self
    }

    pub fn game(mut self, game_id: &str, question_ids: Vec<u32>) -> Self {
        self.games.insert(game_id.to_string(), question_ids);
        self
    }

    pub fn jingle(mut self, jingle: JingleEntity) -> Self {
        self.jingles.push(jingle);
        self
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn start_ms(mut self, start_ms: u64) -> Self {
        self.start_ms = start_ms;
        self
    }

    pub fn build_harness(self) -> TestHarness {
        let clock = Arc::new(ManualClock::new(self.start_ms));
        let results = Arc::new(CapturingResultWriter::default());
        let catalog = Arc::new(StaticCatalog {
            questions: self
                .questions
                .into_iter()
                .map(|question| (question.id, question))
                .collect(),
            games: self.games,
            jingles: self
                .jingles
                .into_iter()
                .map(|jingle| (jingle.id, jingle))
                .collect(),
        });
        let state = AppState::new(
            self.config,
            catalog.clone(),
            catalog,
            results.clone(),
            clock.clone(),
        );
        TestHarness {
            state,
            clock,
            results,
        }
    }

    pub fn build(self) -> SharedState {
        self.build_harness().state
    }
}

/// A catalog MCQ question used across service tests.
pub fn mcq_question(id: u32) -> QuestionEntity {
    QuestionEntity {
        id,
        text: "Capital of France?".into(),
        kind: QuestionKind::Mcq,
        category: Some("geography".into()),
        points: Some(20),
        answers: Some(r#"["Paris","Lyon","Marseille"]"#.into()),
        correct_answer: Some("Paris".into()),
    }
}

/// A catalog rapidity question used across service tests.
pub fn buzzer_question(id: u32) -> QuestionEntity {
    QuestionEntity {
        id,
        text: "First to buzz".into(),
        kind: QuestionKind::Buzzer,
        category: None,
        points: None,
        answers: None,
        correct_answer: None,
    }
}

/// Timestamps with a synced reading.
pub fn synced(at_ms: u64) -> ClientTimestamps {
    ClientTimestamps {
        local: Some(at_ms),
        synced: Some(at_ms),
        calibrated_latency: None,
    }
}

/// Attach a console peer backed by a channel, returning its receiver.
pub fn connect_console(state: &SharedState) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    let console = ConsolePeer::new(Uuid::new_v4().to_string(), tx);
    state.registry().set_console(console);
    rx
}

/// Register a buzzer peer backed by a channel.
pub fn connect_buzzer(
    state: &SharedState,
    id: &str,
) -> (Arc<BuzzerPeer>, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let now = state.now_ms();
    match state
        .registry()
        .register_buzzer(id.to_string(), None, None, tx, now)
    {
        RegisterOutcome::Registered(peer) => (peer, rx),
        other => panic!("test buzzer registration failed: {other:?}"),
    }
}

/// Drain every frame queued on a peer channel.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Message> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

/// Drain a peer channel and decode the text frames.
pub fn drain_server_messages(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<ServerMessage> {
    drain(rx)
        .into_iter()
        .filter_map(|frame| match frame {
            Message::Text(text) => {
                let envelope: Envelope<ServerMessage> =
                    serde_json::from_str(&text).expect("server frame must parse");
                Some(envelope.message)
            }
            _ => None,
        })
        .collect()
}
