use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("migration failed: {0}")]
    Migration(String),
}
