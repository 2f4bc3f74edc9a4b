use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{error::Result, state::PipelineState};

/// A triage run persisted between requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub state: PipelineState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(state: PipelineState) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), state)
    }

    pub fn with_id(id: impl Into<String>, state: PipelineState) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            state,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Session) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory implementation of SessionStorage
#[derive(Default)]
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

#[cfg(feature = "postgres")]
pub use postgres::PostgresSessionStorage;

#[cfg(feature = "postgres")]
mod postgres {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sqlx::{PgPool, Row, postgres::PgPoolOptions, types::Json};
    use tracing::info;

    use super::{Session, SessionStorage};
    use crate::{
        error::{PipelineError, Result},
        state::PipelineState,
    };

    const CREATE_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS petcare_sessions (
            id TEXT PRIMARY KEY,
            state JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
    "#;

    const UPSERT: &str = r#"
        INSERT INTO petcare_sessions (id, state, created_at, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET state = EXCLUDED.state, updated_at = EXCLUDED.updated_at
    "#;

    fn storage_error(err: sqlx::Error) -> PipelineError {
        PipelineError::StorageError(err.to_string())
    }

    /// Sessions stored as JSONB rows in PostgreSQL.
    pub struct PostgresSessionStorage {
        pool: PgPool,
    }

    impl PostgresSessionStorage {
        /// Connects and creates the sessions table if it does not exist.
        pub async fn connect(database_url: &str) -> Result<Self> {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .map_err(storage_error)?;

            sqlx::query(CREATE_TABLE)
                .execute(&pool)
                .await
                .map_err(storage_error)?;

            info!("Connected to PostgreSQL session storage");
            Ok(Self { pool })
        }
    }

    #[async_trait]
    impl SessionStorage for PostgresSessionStorage {
        async fn save(&self, session: Session) -> Result<()> {
            sqlx::query(UPSERT)
                .bind(&session.id)
                .bind(Json(&session.state))
                .bind(session.created_at)
                .bind(session.updated_at)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
            Ok(())
        }

        async fn get(&self, id: &str) -> Result<Option<Session>> {
            let row = sqlx::query(
                "SELECT id, state, created_at, updated_at FROM petcare_sessions WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

            let Some(row) = row else {
                return Ok(None);
            };

            let state: Json<PipelineState> = row.try_get("state").map_err(storage_error)?;
            let created_at: DateTime<Utc> = row.try_get("created_at").map_err(storage_error)?;
            let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(storage_error)?;

            Ok(Some(Session {
                id: row.try_get("id").map_err(storage_error)?,
                state: state.0,
                created_at,
                updated_at,
            }))
        }

        async fn delete(&self, id: &str) -> Result<()> {
            sqlx::query("DELETE FROM petcare_sessions WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
            Ok(())
        }
    }
}
