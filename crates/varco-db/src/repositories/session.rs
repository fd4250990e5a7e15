//! Browser-session persistence (PostgreSQL)

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use tracing::instrument;

use varco_core::{Result, SessionData, SessionId, SessionStore, VarcoError};

fn db_err(e: sqlx::Error) -> VarcoError {
    VarcoError::database(e.to_string())
}

/// Sessions serialized as JSONB rows keyed by session id
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    #[instrument(skip(self))]
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>> {
        let row = sqlx::query("SELECT data FROM sessions WHERE id = $1")
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data: serde_json::Value = row.try_get("data").map_err(db_err)?;
        let session = serde_json::from_value(data)
            .map_err(|e| VarcoError::database(format!("corrupt session row: {e}")))?;
        Ok(Some(session))
    }

    #[instrument(skip(self, data))]
    async fn save(&self, id: &SessionId, data: &SessionData) -> Result<()> {
        let json = serde_json::to_value(data)
            .map_err(|e| VarcoError::internal(format!("session serialization: {e}")))?;

        sqlx::query(
            "INSERT INTO sessions (id, data, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET data = $2, updated_at = $3",
        )
        .bind(id.into_uuid())
        .bind(json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &SessionId) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id.into_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }
}
