use thiserror::Error;

use crate::bot::TransportError;
use crate::db::DatabaseError;

#[derive(Debug, Error)]
pub enum BotError {
    /// Credentials were rejected. Never retried.
    #[error("fatal transport failure: {0}")]
    TransportFatal(String),
    #[error("transport error: {0}")]
    TransportTransient(#[from] TransportError),
    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),
    #[error("task failed: {0}")]
    Task(String),
}

impl BotError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BotError::TransportFatal(_))
    }
}
