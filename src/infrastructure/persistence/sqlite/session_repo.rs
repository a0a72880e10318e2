//! SQLite Session Backend
//!
//! 会话整体序列化为 JSON 存入 `payload` 列；`created_at` / `expires_at`
//! 冗余存储，仅用于排序和过期查询。

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::FromRow;
use std::sync::Arc;
use uuid::Uuid;

use super::DbPool;
use crate::application::ports::{BackendCounts, SessionBackend, SessionBackendError};
use crate::domain::SessionRecord;

/// SQLite 持久会话后端
pub struct SqliteSessionBackend {
    pool: DbPool,
}

impl SqliteSessionBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[derive(FromRow)]
struct SessionRow {
    payload: String,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = SessionBackendError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        serde_json::from_str(&row.payload)
            .map_err(|e| SessionBackendError::SerializationError(e.to_string()))
    }
}

/// 定宽 UTC 时间串，字典序即时间序
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn db_error(e: sqlx::Error) -> SessionBackendError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            SessionBackendError::Unavailable(e.to_string())
        }
        other => SessionBackendError::DatabaseError(other.to_string()),
    }
}

#[async_trait]
impl SessionBackend for SqliteSessionBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionBackendError> {
        let payload = serde_json::to_string(record)
            .map_err(|e| SessionBackendError::SerializationError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO persistent_sessions (id, payload, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(record.session_id.to_string())
        .bind(payload)
        .bind(timestamp(record.created_at))
        .bind(record.expires_at.map(timestamp))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn update(
        &self,
        record: &SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionBackendError> {
        let payload = serde_json::to_string(record)
            .map_err(|e| SessionBackendError::SerializationError(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE persistent_sessions
            SET payload = ?, expires_at = ?
            WHERE id = ? AND (expires_at IS NULL OR expires_at >= ?)
            "#,
        )
        .bind(payload)
        .bind(record.expires_at.map(timestamp))
        .bind(record.session_id.to_string())
        .bind(timestamp(now))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, id: Uuid) -> Result<Option<SessionRecord>, SessionBackendError> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT payload FROM persistent_sessions WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(SessionRecord::try_from).transpose()
    }

    async fn remove(&self, id: Uuid) -> Result<bool, SessionBackendError> {
        let result = sqlx::query("DELETE FROM persistent_sessions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_if_expired(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionBackendError> {
        let result = sqlx::query(
            "DELETE FROM persistent_sessions WHERE id = ? AND expires_at IS NOT NULL AND expires_at < ?",
        )
        .bind(id.to_string())
        .bind(timestamp(now))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn expired_ids(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, SessionBackendError> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM persistent_sessions WHERE expires_at IS NOT NULL AND expires_at < ?",
        )
        .bind(timestamp(now))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        ids.into_iter()
            .map(|(id,)| {
                Uuid::parse_str(&id)
                    .map_err(|e| SessionBackendError::SerializationError(e.to_string()))
            })
            .collect()
    }

    async fn list(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionRecord>, SessionBackendError> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT payload FROM persistent_sessions ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(SessionRecord::try_from).collect()
    }

    async fn counts(&self, now: DateTime<Utc>) -> Result<BackendCounts, SessionBackendError> {
        let (total, expired): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN expires_at IS NOT NULL AND expires_at < ? THEN 1 ELSE 0 END), 0)
            FROM persistent_sessions
            "#,
        )
        .bind(timestamp(now))
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(BackendCounts {
            total: total as u64,
            expired: expired as u64,
        })
    }

    async fn clear(&self) -> Result<u64, SessionBackendError> {
        let result = sqlx::query("DELETE FROM persistent_sessions")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }
}
