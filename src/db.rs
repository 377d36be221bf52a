pub use self::error::DatabaseError;
pub use self::leaderboard::{Leaderboard, format_report};
pub use self::manager::DatabaseManager;
pub use self::models::{
    AuthorMetricPair, MessageReactionCount, NewProps, PropsMessage, ReactionKey,
};
pub use self::stores::{PropsStore, ReactionStore};

pub mod error;
pub mod leaderboard;
pub mod manager;
pub mod models;
pub mod stores;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub mod schema;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub mod schema_sqlite;
