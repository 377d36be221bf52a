use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::db::manager::Pool;
use crate::db::schema::{props, reactions};

use super::{
    DatabaseError,
    models::{
        AuthorMetricPair, MessageReactionCount, NewProps, PropsMessage, PropsRecord, ReactionKey,
        ReactionRecord,
    },
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = props)]
struct DbProps {
    id: i64,
    connection_key: String,
    connection_id: i64,
    source_author: String,
    source_timestamp: String,
    source_message: String,
    source_channel: String,
    target_channel: String,
    theme: i32,
    target_timestamp: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DbProps> for PropsRecord {
    fn from(value: DbProps) -> Self {
        Self {
            id: value.id,
            connection_key: value.connection_key,
            connection_id: value.connection_id,
            source_author: value.source_author,
            source_timestamp: value.source_timestamp,
            source_message: value.source_message,
            source_channel: value.source_channel,
            target_channel: value.target_channel,
            theme: value.theme,
            target_timestamp: value.target_timestamp,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = props)]
struct NewPropsRow<'a> {
    connection_key: &'a str,
    connection_id: i64,
    source_author: &'a str,
    source_timestamp: &'a str,
    source_message: &'a str,
    source_channel: &'a str,
    target_channel: &'a str,
    theme: i32,
    created_at: &'a DateTime<Utc>,
    updated_at: &'a DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = reactions)]
struct DbReaction {
    id: i64,
    channel: String,
    message_timestamp: String,
    reaction_user: String,
    reaction: String,
    removed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DbReaction> for ReactionRecord {
    fn from(value: DbReaction) -> Self {
        Self {
            id: value.id,
            channel: value.channel,
            message_timestamp: value.message_timestamp,
            reaction_user: value.reaction_user,
            reaction: value.reaction,
            removed: value.removed,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = reactions)]
struct NewReactionRow<'a> {
    channel: &'a str,
    message_timestamp: &'a str,
    reaction_user: &'a str,
    reaction: &'a str,
    removed: bool,
    created_at: &'a DateTime<Utc>,
    updated_at: &'a DateTime<Utc>,
}

async fn with_connection<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::StorageUnavailable(e.to_string()))?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::QueryFailed(format!("database task failed: {e}")))?
}

pub struct PostgresPropsStore {
    pool: Pool,
}

impl PostgresPropsStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::PropsStore for PostgresPropsStore {
    async fn create_props(&self, new_props: &NewProps) -> Result<i64, DatabaseError> {
        let pool = self.pool.clone();
        let new_props = new_props.clone();
        with_connection(pool, move |conn| {
            let now = Utc::now();
            let row = NewPropsRow {
                connection_key: &new_props.connection_key,
                connection_id: new_props.connection_id,
                source_author: &new_props.source_author,
                source_timestamp: &new_props.source_timestamp,
                source_message: &new_props.source_message,
                source_channel: &new_props.source_channel,
                target_channel: new_props.target_channel(),
                theme: new_props.theme,
                created_at: &now,
                updated_at: &now,
            };

            diesel::insert_into(props::table)
                .values(&row)
                .returning(props::id)
                .get_result::<i64>(conn)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
        })
        .await
    }

    async fn correlate_reply(
        &self,
        key: &str,
        reply_id: i64,
        timestamp: &str,
    ) -> Result<bool, DatabaseError> {
        let pool = self.pool.clone();
        let key = key.to_string();
        let timestamp = timestamp.to_string();
        with_connection(pool, move |conn| {
            use crate::db::schema::props::dsl::*;
            diesel::update(
                props
                    .filter(connection_key.eq(key))
                    .filter(connection_id.eq(reply_id))
                    .filter(target_timestamp.is_null()),
            )
            .set((
                target_timestamp.eq(Some(timestamp)),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .map(|changed| changed > 0)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
        })
        .await
    }

    async fn get_props_by_connection(
        &self,
        key: &str,
        reply_id: i64,
    ) -> Result<Option<PropsRecord>, DatabaseError> {
        let pool = self.pool.clone();
        let key = key.to_string();
        with_connection(pool, move |conn| {
            use crate::db::schema::props::dsl::*;
            props
                .filter(connection_key.eq(key))
                .filter(connection_id.eq(reply_id))
                .select(DbProps::as_select())
                .first::<DbProps>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
        })
        .await
    }

    async fn count_props_by_author(&self) -> Result<Vec<AuthorMetricPair>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::props::dsl::*;
            props
                .group_by(source_author)
                .select((source_author, count_star()))
                .load::<(String, i64)>(conn)
                .map(|rows| {
                    rows.into_iter()
                        .map(|(author, count)| AuthorMetricPair::new(author, count))
                        .collect()
                })
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
        })
        .await
    }

    async fn list_props_messages(&self) -> Result<Vec<PropsMessage>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::props::dsl::*;
            props
                .order(id.asc())
                .select((target_channel, target_timestamp, source_message))
                .load::<(String, Option<String>, String)>(conn)
                .map(|rows| {
                    rows.into_iter()
                        .map(|(channel, timestamp, message)| PropsMessage {
                            target_channel: channel,
                            target_timestamp: timestamp,
                            source_message: message,
                        })
                        .collect()
                })
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
        })
        .await
    }
}

pub struct PostgresReactionStore {
    pool: Pool,
}

impl PostgresReactionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::ReactionStore for PostgresReactionStore {
    async fn upsert_reaction(&self, key: &ReactionKey) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let key = key.clone();
        with_connection(pool, move |conn| {
            let now = Utc::now();
            let row = NewReactionRow {
                channel: &key.channel,
                message_timestamp: &key.message_timestamp,
                reaction_user: &key.reaction_user,
                reaction: &key.reaction,
                removed: false,
                created_at: &now,
                updated_at: &now,
            };

            diesel::insert_into(reactions::table)
                .values(&row)
                .on_conflict((
                    reactions::channel,
                    reactions::message_timestamp,
                    reactions::reaction_user,
                    reactions::reaction,
                ))
                .do_update()
                .set((reactions::removed.eq(false), reactions::updated_at.eq(now)))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
        })
        .await
    }

    async fn mark_reaction_removed(&self, key: &ReactionKey) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let key = key.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::reactions::dsl::*;
            diesel::update(
                reactions
                    .filter(channel.eq(&key.channel))
                    .filter(message_timestamp.eq(&key.message_timestamp))
                    .filter(reaction_user.eq(&key.reaction_user))
                    .filter(reaction.eq(&key.reaction)),
            )
            .set((removed.eq(true), updated_at.eq(Utc::now())))
            .execute(conn)
            .map(|_| ())
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
        })
        .await
    }

    async fn get_reaction(
        &self,
        key: &ReactionKey,
    ) -> Result<Option<ReactionRecord>, DatabaseError> {
        let pool = self.pool.clone();
        let key = key.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::reactions::dsl::*;
            reactions
                .filter(channel.eq(&key.channel))
                .filter(message_timestamp.eq(&key.message_timestamp))
                .filter(reaction_user.eq(&key.reaction_user))
                .filter(reaction.eq(&key.reaction))
                .select(DbReaction::as_select())
                .first::<DbReaction>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
        })
        .await
    }

    async fn count_reactions_by_user(&self) -> Result<Vec<AuthorMetricPair>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::reactions::dsl::*;
            reactions
                .filter(removed.eq(false))
                .group_by(reaction_user)
                .select((reaction_user, count_star()))
                .load::<(String, i64)>(conn)
                .map(|rows| {
                    rows.into_iter()
                        .map(|(user, count)| AuthorMetricPair::new(user, count))
                        .collect()
                })
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
        })
        .await
    }

    async fn count_reactions_by_message(
        &self,
    ) -> Result<Vec<MessageReactionCount>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::reactions::dsl::*;
            reactions
                .filter(removed.eq(false))
                .group_by((channel, message_timestamp))
                .select((channel, message_timestamp, count_star()))
                .load::<(String, String, i64)>(conn)
                .map(|rows| {
                    rows.into_iter()
                        .map(|(chan, timestamp, count)| MessageReactionCount {
                            channel: chan,
                            message_timestamp: timestamp,
                            count,
                        })
                        .collect()
                })
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
        })
        .await
    }
}
