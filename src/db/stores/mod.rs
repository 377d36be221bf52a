use async_trait::async_trait;

use super::DatabaseError;
use super::models::{
    AuthorMetricPair, MessageReactionCount, NewProps, PropsMessage, PropsRecord, ReactionKey,
    ReactionRecord,
};

#[async_trait]
pub trait PropsStore: Send + Sync {
    /// Inserts a props row and returns its database id.
    async fn create_props(&self, props: &NewProps) -> Result<i64, DatabaseError>;
    /// Sets `target_timestamp` on the row sent as `(connection_key,
    /// connection_id)` if it is still unset. Returns whether a row changed;
    /// an unknown or already correlated send yields `Ok(false)`.
    async fn correlate_reply(
        &self,
        connection_key: &str,
        connection_id: i64,
        target_timestamp: &str,
    ) -> Result<bool, DatabaseError>;
    async fn get_props_by_connection(
        &self,
        connection_key: &str,
        connection_id: i64,
    ) -> Result<Option<PropsRecord>, DatabaseError>;
    async fn count_props_by_author(&self) -> Result<Vec<AuthorMetricPair>, DatabaseError>;
    async fn list_props_messages(&self) -> Result<Vec<PropsMessage>, DatabaseError>;
}

#[async_trait]
pub trait ReactionStore: Send + Sync {
    /// Inserts the tuple, or clears `removed` when it already exists.
    async fn upsert_reaction(&self, key: &ReactionKey) -> Result<(), DatabaseError>;
    async fn mark_reaction_removed(&self, key: &ReactionKey) -> Result<(), DatabaseError>;
    async fn get_reaction(&self, key: &ReactionKey)
    -> Result<Option<ReactionRecord>, DatabaseError>;
    /// Live (not removed) reactions per reacting user.
    async fn count_reactions_by_user(&self) -> Result<Vec<AuthorMetricPair>, DatabaseError>;
    /// Live reactions per `(channel, message_timestamp)`.
    async fn count_reactions_by_message(
        &self,
    ) -> Result<Vec<MessageReactionCount>, DatabaseError>;
}
