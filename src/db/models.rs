use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recognition reply sent by the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropsRecord {
    pub id: i64,
    pub connection_key: String,
    pub connection_id: i64,
    pub source_author: String,
    /// Provider timestamp string, stored verbatim.
    pub source_timestamp: String,
    pub source_message: String,
    pub source_channel: String,
    pub target_channel: String,
    pub theme: i32,
    pub target_timestamp: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProps {
    pub connection_key: String,
    pub connection_id: i64,
    pub source_author: String,
    pub source_timestamp: String,
    pub source_message: String,
    pub source_channel: String,
    pub theme: i32,
}

impl NewProps {
    /// Replies always go back to the channel the props came from.
    pub fn target_channel(&self) -> &str {
        &self.source_channel
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub id: i64,
    pub channel: String,
    pub message_timestamp: String,
    pub reaction_user: String,
    pub reaction: String,
    pub removed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The unique tuple identifying a reaction row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReactionKey {
    pub channel: String,
    pub message_timestamp: String,
    pub reaction_user: String,
    pub reaction: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorMetricPair {
    pub author: String,
    pub value: i64,
}

impl AuthorMetricPair {
    pub fn new(author: impl Into<String>, value: i64) -> Self {
        Self {
            author: author.into(),
            value,
        }
    }
}

/// The slice of a props row the receiver leaderboard needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropsMessage {
    pub target_channel: String,
    pub target_timestamp: Option<String>,
    pub source_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReactionCount {
    pub channel: String,
    pub message_timestamp: String,
    pub count: i64,
}
