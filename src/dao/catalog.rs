//! File-backed catalog store and JSONL results writer.
//!
//! The durable question/jingle store lives outside this service; the catalog
//! files give the binary a concrete collaborator to run against.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::{FutureExt, future::BoxFuture};
use serde::Deserialize;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::info;

use crate::dao::{
    JingleStore, QuestionStore, ResultWriter, StorageResult,
    models::{AnswerRecordEntity, JingleEntity, QuestionEntity},
};

/// Catalog file listing questions and the per-game question order.
const QUESTIONS_FILE: &str = "questions.json";
/// Catalog file listing jingle metadata.
const JINGLES_FILE: &str = "jingles.json";

#[derive(Debug, Default, Deserialize)]
struct QuestionsFile {
    #[serde(default)]
    questions: Vec<QuestionEntity>,
    /// Ordered question IDs per game identifier.
    #[serde(default)]
    games: HashMap<String, Vec<u32>>,
}

#[derive(Debug, Default, Deserialize)]
struct JinglesFile {
    #[serde(default)]
    jingles: Vec<JingleEntity>,
}

/// Immutable in-memory snapshot of the catalog files.
pub struct FileCatalog {
    questions: HashMap<u32, QuestionEntity>,
    games: HashMap<String, Vec<u32>>,
    jingles: HashMap<u32, JingleEntity>,
}

impl FileCatalog {
    /// Read and parse the catalog files under `data_dir`.
    ///
    /// A missing file yields an empty section; a malformed one is a startup
    /// failure.
    pub fn load(data_dir: &Path) -> StorageResult<Arc<Self>> {
        let questions_file: QuestionsFile = read_optional(&data_dir.join(QUESTIONS_FILE))?;
        let jingles_file: JinglesFile = read_optional(&data_dir.join(JINGLES_FILE))?;

        let questions: HashMap<u32, QuestionEntity> = questions_file
            .questions
            .into_iter()
            .map(|question| (question.id, question))
            .collect();
        let jingles: HashMap<u32, JingleEntity> = jingles_file
            .jingles
            .into_iter()
            .map(|jingle| (jingle.id, jingle))
            .collect();

        info!(
            dir = %data_dir.display(),
            questions = questions.len(),
            jingles = jingles.len(),
            "loaded catalog"
        );

        Ok(Arc::new(Self {
            questions,
            games: questions_file.games,
            jingles,
        }))
    }
}

fn read_optional<T: Default + serde::de::DeserializeOwned>(path: &Path) -> StorageResult<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(err.into()),
    }
}

impl QuestionStore for FileCatalog {
    fn find_question(&self, id: u32) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let question = self.questions.get(&id).cloned();
        async move { Ok(question) }.boxed()
    }

    fn game_questions(&self, game_id: &str) -> BoxFuture<'static, StorageResult<Vec<u32>>> {
        let ids = self.games.get(game_id).cloned().unwrap_or_default();
        async move { Ok(ids) }.boxed()
    }
}

impl JingleStore for FileCatalog {
    fn find_jingle(&self, id: u32) -> BoxFuture<'static, StorageResult<Option<JingleEntity>>> {
        let jingle = self.jingles.get(&id).cloned();
        async move { Ok(jingle) }.boxed()
    }
}

/// Appends one JSON object per answer to the configured results file.
pub struct JsonlResultWriter {
    path: PathBuf,
    /// Serializes appends so rows never interleave.
    write_gate: Arc<Mutex<()>>,
}

impl JsonlResultWriter {
    pub fn new(path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            path,
            write_gate: Arc::new(Mutex::new(())),
        })
    }
}

impl ResultWriter for JsonlResultWriter {
    fn record_answer(&self, row: AnswerRecordEntity) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path.clone();
        let gate = self.write_gate.clone();
        async move {
            let mut line = serde_json::to_string(&row)?;
            line.push('\n');

            let _guard = gate.lock().await;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            Ok(())
        }
        .boxed()
    }
}
