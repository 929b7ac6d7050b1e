use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Question flavour: indexed multiple choice or first-to-press rapidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuestionKind {
    Mcq,
    Buzzer,
}

/// Stored representation of a question.
///
/// `answers` keeps the catalog's JSON-string form; it is decoded when the
/// question is dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionEntity {
    pub id: u32,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub points: Option<u32>,
    /// JSON-encoded array of answer labels for MCQ questions.
    #[serde(default)]
    pub answers: Option<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
}

/// Stored jingle metadata. `path` is relative to the configured jingle root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JingleEntity {
    pub id: u32,
    pub name: String,
    pub path: String,
}

/// One persisted answer outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecordEntity {
    pub game_id: String,
    pub question_id: u32,
    pub buzzer_id: String,
    pub player_name: String,
    #[serde(default)]
    pub answer: Option<String>,
    pub is_correct: bool,
    pub points: u32,
    pub response_time_ms: u64,
    pub recorded_at_ms: u64,
}
