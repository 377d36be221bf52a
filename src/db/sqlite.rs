use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crate::db::schema_sqlite::{props, reactions};

use super::{
    DatabaseError,
    models::{
        AuthorMetricPair, MessageReactionCount, NewProps, PropsMessage, PropsRecord, ReactionKey,
        ReactionRecord,
    },
};

// Helper function to convert DateTime to ISO string for SQLite
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// Helper function to parse ISO string to DateTime
fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::QueryFailed(format!("invalid datetime format: {}", e)))
}

// SQLite uses i32 for INTEGER (primary keys), but we want to keep i64 in our API
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = props)]
struct DbProps {
    id: i32,
    connection_key: String,
    connection_id: i64,
    source_author: String,
    source_timestamp: String,
    source_message: String,
    source_channel: String,
    target_channel: String,
    theme: i32,
    target_timestamp: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DbProps {
    fn into_props_record(self) -> Result<PropsRecord, DatabaseError> {
        Ok(PropsRecord {
            id: self.id as i64,
            created_at: string_to_datetime(&self.created_at)?,
            updated_at: string_to_datetime(&self.updated_at)?,
            connection_key: self.connection_key,
            connection_id: self.connection_id,
            source_author: self.source_author,
            source_timestamp: self.source_timestamp,
            source_message: self.source_message,
            source_channel: self.source_channel,
            target_channel: self.target_channel,
            theme: self.theme,
            target_timestamp: self.target_timestamp,
        })
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
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = reactions)]
struct DbReaction {
    id: i32,
    channel: String,
    message_timestamp: String,
    reaction_user: String,
    reaction: String,
    removed: bool,
    created_at: String,
    updated_at: String,
}

impl DbReaction {
    fn into_reaction_record(self) -> Result<ReactionRecord, DatabaseError> {
        Ok(ReactionRecord {
            id: self.id as i64,
            created_at: string_to_datetime(&self.created_at)?,
            updated_at: string_to_datetime(&self.updated_at)?,
            channel: self.channel,
            message_timestamp: self.message_timestamp,
            reaction_user: self.reaction_user,
            reaction: self.reaction,
            removed: self.removed,
        })
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
    created_at: String,
    updated_at: String,
}

fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    SqliteConnection::establish(path)
        .map_err(|e| DatabaseError::StorageUnavailable(e.to_string()))
}

async fn with_connection<T, F>(db_path: Arc<String>, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = establish_connection(&db_path)?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::QueryFailed(format!("database task failed: {e}")))?
}

pub struct SqlitePropsStore {
    db_path: Arc<String>,
}

impl SqlitePropsStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::PropsStore for SqlitePropsStore {
    async fn create_props(&self, new_props: &NewProps) -> Result<i64, DatabaseError> {
        let new_props = new_props.clone();
        with_connection(self.db_path.clone(), move |conn| {
            let now = datetime_to_string(&Utc::now());
            let row = NewPropsRow {
                connection_key: &new_props.connection_key,
                connection_id: new_props.connection_id,
                source_author: &new_props.source_author,
                source_timestamp: &new_props.source_timestamp,
                source_message: &new_props.source_message,
                source_channel: &new_props.source_channel,
                target_channel: new_props.target_channel(),
                theme: new_props.theme,
                created_at: now.clone(),
                updated_at: now,
            };

            diesel::insert_into(props::table)
                .values(&row)
                .returning(props::id)
                .get_result::<i32>(conn)
                .map(i64::from)
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
        let key = key.to_string();
        let timestamp = timestamp.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::props::dsl::*;
            diesel::update(
                props
                    .filter(connection_key.eq(key))
                    .filter(connection_id.eq(reply_id))
                    .filter(target_timestamp.is_null()),
            )
            .set((
                target_timestamp.eq(Some(timestamp)),
                updated_at.eq(datetime_to_string(&Utc::now())),
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
        let key = key.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::props::dsl::*;
            props
                .filter(connection_key.eq(key))
                .filter(connection_id.eq(reply_id))
                .select(DbProps::as_select())
                .first::<DbProps>(conn)
                .optional()
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
                .map(DbProps::into_props_record)
                .transpose()
        })
        .await
    }

    async fn count_props_by_author(&self) -> Result<Vec<AuthorMetricPair>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::props::dsl::*;
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
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::props::dsl::*;
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

pub struct SqliteReactionStore {
    db_path: Arc<String>,
}

impl SqliteReactionStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::ReactionStore for SqliteReactionStore {
    async fn upsert_reaction(&self, key: &ReactionKey) -> Result<(), DatabaseError> {
        let key = key.clone();
        with_connection(self.db_path.clone(), move |conn| {
            let now = datetime_to_string(&Utc::now());
            let row = NewReactionRow {
                channel: &key.channel,
                message_timestamp: &key.message_timestamp,
                reaction_user: &key.reaction_user,
                reaction: &key.reaction,
                removed: false,
                created_at: now.clone(),
                updated_at: now.clone(),
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
        let key = key.clone();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::reactions::dsl::*;
            diesel::update(
                reactions
                    .filter(channel.eq(&key.channel))
                    .filter(message_timestamp.eq(&key.message_timestamp))
                    .filter(reaction_user.eq(&key.reaction_user))
                    .filter(reaction.eq(&key.reaction)),
            )
            .set((
                removed.eq(true),
                updated_at.eq(datetime_to_string(&Utc::now())),
            ))
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
        let key = key.clone();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::reactions::dsl::*;
            reactions
                .filter(channel.eq(&key.channel))
                .filter(message_timestamp.eq(&key.message_timestamp))
                .filter(reaction_user.eq(&key.reaction_user))
                .filter(reaction.eq(&key.reaction))
                .select(DbReaction::as_select())
                .first::<DbReaction>(conn)
                .optional()
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
                .map(DbReaction::into_reaction_record)
                .transpose()
        })
        .await
    }

    async fn count_reactions_by_user(&self) -> Result<Vec<AuthorMetricPair>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::reactions::dsl::*;
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
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::reactions::dsl::*;
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
