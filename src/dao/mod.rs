//! Interfaces to the external collaborators the core consumes: question and
//! jingle lookups plus the persistent results writer.

pub mod catalog;
pub mod models;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::dao::models::{AnswerRecordEntity, JingleEntity, QuestionEntity};

/// Result alias shared by every storage-facing call.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures raised by the catalog and the results writer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("catalog io: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog parse: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read access to the question catalog.
pub trait QuestionStore: Send + Sync {
    fn find_question(&self, id: u32) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>>;
    fn game_questions(&self, game_id: &str) -> BoxFuture<'static, StorageResult<Vec<u32>>>;
}

/// Read access to jingle metadata and stored file paths.
pub trait JingleStore: Send + Sync {
    fn find_jingle(&self, id: u32) -> BoxFuture<'static, StorageResult<Option<JingleEntity>>>;
}

/// Sink for per-answer result rows.
///
/// Write failures are reported to the caller but never propagate into game
/// state; the in-memory session stays authoritative.
pub trait ResultWriter: Send + Sync {
    fn record_answer(&self, row: AnswerRecordEntity) -> BoxFuture<'static, StorageResult<()>>;
}
