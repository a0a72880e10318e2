//! Session Backend Port - 会话存储后端
//!
//! 两种实现共用一个接口：
//! - 进程内 TTL 表（临时会话）
//! - 共享的持久化 KV 后端（持久会话）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::SessionRecord;

/// Session 后端错误
#[derive(Debug, Clone, Error)]
pub enum SessionBackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// 后端计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCounts {
    pub total: u64,
    pub expired: u64,
}

/// Session Backend Port
///
/// 单条记录读写，不需要跨记录事务
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// 后端名称（日志用）
    fn name(&self) -> &'static str;

    /// 插入或覆盖会话
    async fn save(&self, record: &SessionRecord) -> Result<(), SessionBackendError>;

    /// 仅更新已存在且在 `now` 未过期的会话，返回是否更新
    ///
    /// 不会重新插入已删除或已过期的记录
    async fn update(
        &self,
        record: &SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionBackendError>;

    /// 查找会话（不做过期判断）
    async fn find(&self, id: Uuid) -> Result<Option<SessionRecord>, SessionBackendError>;

    /// 删除会话，返回是否存在
    async fn remove(&self, id: Uuid) -> Result<bool, SessionBackendError>;

    /// 仅当记录在 `now` 已过期时删除，返回是否删除
    async fn remove_if_expired(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionBackendError>;

    /// 返回在 `now` 已过期的会话 ID
    async fn expired_ids(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, SessionBackendError>;

    /// 按创建时间倒序分页列出
    async fn list(&self, limit: usize, offset: usize)
        -> Result<Vec<SessionRecord>, SessionBackendError>;

    /// 统计总数与过期数
    async fn counts(&self, now: DateTime<Utc>) -> Result<BackendCounts, SessionBackendError>;

    /// 清空后端，返回删除数
    async fn clear(&self) -> Result<u64, SessionBackendError>;
}
