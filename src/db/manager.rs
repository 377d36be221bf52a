use crate::config::{DatabaseConfig as ConfigDatabaseConfig, DbType as ConfigDbType};
use crate::db::{DatabaseError, Leaderboard, PropsStore, ReactionStore};
use diesel::RunQueryDsl;
use std::sync::Arc;

#[cfg(feature = "postgres")]
use crate::db::postgres::{PostgresPropsStore, PostgresReactionStore};
#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "postgres")]
use diesel::r2d2::{self, ConnectionManager};

#[cfg(feature = "postgres")]
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[cfg(feature = "sqlite")]
use crate::db::sqlite::{SqlitePropsStore, SqliteReactionStore};
#[cfg(feature = "sqlite")]
use diesel::Connection;
#[cfg(feature = "sqlite")]
use diesel::sqlite::SqliteConnection;

#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "postgres")]
    postgres_pool: Option<Pool>,
    #[cfg(feature = "sqlite")]
    sqlite_path: Option<String>,
    props_store: Arc<dyn PropsStore>,
    reaction_store: Arc<dyn ReactionStore>,
    db_type: DbType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl From<ConfigDbType> for DbType {
    fn from(value: ConfigDbType) -> Self {
        match value {
            ConfigDbType::Postgres => DbType::Postgres,
            ConfigDbType::Sqlite => DbType::Sqlite,
        }
    }
}

impl DatabaseManager {
    pub async fn new(config: &ConfigDatabaseConfig) -> Result<Self, DatabaseError> {
        let db_type = DbType::from(config.db_type());

        match db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let connection_string = config.connection_string();
                let max_connections = config.max_connections();
                let min_connections = config.min_connections();

                let manager = ConnectionManager::<PgConnection>::new(connection_string);

                let builder = r2d2::Pool::builder()
                    .max_size(max_connections.unwrap_or(10))
                    .min_idle(Some(min_connections.unwrap_or(1)));

                let pool = builder
                    .build(manager)
                    .map_err(|e| DatabaseError::StorageUnavailable(e.to_string()))?;

                let props_store = Arc::new(PostgresPropsStore::new(pool.clone()));
                let reaction_store = Arc::new(PostgresReactionStore::new(pool.clone()));

                Ok(Self {
                    postgres_pool: Some(pool),
                    #[cfg(feature = "sqlite")]
                    sqlite_path: None,
                    props_store,
                    reaction_store,
                    db_type,
                })
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = config.sqlite_path().ok_or_else(|| {
                    DatabaseError::StorageUnavailable("missing sqlite path".to_string())
                })?;
                let path_arc = Arc::new(path.clone());

                let props_store = Arc::new(SqlitePropsStore::new(path_arc.clone()));
                let reaction_store = Arc::new(SqliteReactionStore::new(path_arc));

                Ok(Self {
                    #[cfg(feature = "postgres")]
                    postgres_pool: None,
                    sqlite_path: Some(path),
                    props_store,
                    reaction_store,
                    db_type,
                })
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::StorageUnavailable(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::StorageUnavailable(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let pool = self.postgres_pool.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("postgres pool not initialised".to_string())
                })?;
                Self::migrate_postgres(pool).await
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = self.sqlite_path.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("sqlite path not initialised".to_string())
                })?;
                Self::migrate_sqlite(path).await
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Migration(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Migration(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    #[cfg(feature = "postgres")]
    async fn migrate_postgres(pool: &Pool) -> Result<(), DatabaseError> {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DatabaseError::StorageUnavailable(e.to_string()))?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS props (
                    id BIGSERIAL PRIMARY KEY,
                    connection_key TEXT NOT NULL,
                    connection_id BIGINT NOT NULL,
                    source_author TEXT NOT NULL,
                    source_timestamp TEXT NOT NULL,
                    source_message TEXT NOT NULL,
                    source_channel TEXT NOT NULL,
                    target_channel TEXT NOT NULL,
                    theme INTEGER NOT NULL,
                    target_timestamp TEXT,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS reactions (
                    id BIGSERIAL PRIMARY KEY,
                    channel TEXT NOT NULL,
                    message_timestamp TEXT NOT NULL,
                    reaction_user TEXT NOT NULL,
                    reaction TEXT NOT NULL,
                    removed BOOLEAN NOT NULL DEFAULT FALSE,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
                )
                "#,
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_props_connection ON props(connection_key, connection_id)",
                "CREATE INDEX IF NOT EXISTS idx_props_source_author ON props(source_author)",
                "CREATE INDEX IF NOT EXISTS idx_props_target ON props(target_channel, target_timestamp)",
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_reactions_tuple ON reactions(channel, message_timestamp, reaction_user, reaction)",
                "CREATE INDEX IF NOT EXISTS idx_reactions_user ON reactions(reaction_user)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    #[cfg(feature = "sqlite")]
    async fn migrate_sqlite(path: &str) -> Result<(), DatabaseError> {
        let path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = SqliteConnection::establish(&path)
                .map_err(|e| DatabaseError::StorageUnavailable(e.to_string()))?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS props (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    connection_key TEXT NOT NULL,
                    connection_id BIGINT NOT NULL,
                    source_author TEXT NOT NULL,
                    source_timestamp TEXT NOT NULL,
                    source_message TEXT NOT NULL,
                    source_channel TEXT NOT NULL,
                    target_channel TEXT NOT NULL,
                    theme INTEGER NOT NULL,
                    target_timestamp TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS reactions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    channel TEXT NOT NULL,
                    message_timestamp TEXT NOT NULL,
                    reaction_user TEXT NOT NULL,
                    reaction TEXT NOT NULL,
                    removed BOOLEAN NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                "#,
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_props_connection ON props(connection_key, connection_id)",
                "CREATE INDEX IF NOT EXISTS idx_props_source_author ON props(source_author)",
                "CREATE INDEX IF NOT EXISTS idx_props_target ON props(target_channel, target_timestamp)",
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_reactions_tuple ON reactions(channel, message_timestamp, reaction_user, reaction)",
                "CREATE INDEX IF NOT EXISTS idx_reactions_user ON reactions(reaction_user)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn props_store(&self) -> Arc<dyn PropsStore> {
        self.props_store.clone()
    }

    pub fn reaction_store(&self) -> Arc<dyn ReactionStore> {
        self.reaction_store.clone()
    }

    pub fn leaderboard(&self) -> Leaderboard {
        Leaderboard::new(self.props_store.clone(), self.reaction_store.clone())
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }
}
