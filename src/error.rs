use thiserror::Error;

use crate::dao::StorageError;

/// Failures surfaced by the session engine and console operations.
///
/// None of these are fatal: handlers turn them into an `ERROR` message for
/// the console (or a `JINGLE_ERROR` for the jingle pipeline) and carry on.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage failure")]
    Storage(#[from] StorageError),
}
