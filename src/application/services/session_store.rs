//! Session Store - 会话管理
//!
//! 两个后端在构造时确定：
//! - 临时会话：进程内 TTL 表，读时惰性过期，后台定期清扫
//! - 持久会话：共享的持久化后端，永不过期
//!
//! 后端归属在创建时固定，之后不再改变。

use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::single_flight::SingleFlight;
use crate::application::error::BrokerError;
use crate::application::ports::{Clock, Segmenter, SessionBackend};
use crate::domain::{validate_voice_id, SessionMetadata, SessionRecord, SessionSummary};

/// 默认会话 TTL（1 小时）
pub const DEFAULT_SESSION_TTL_SECS: i64 = 60 * 60;

/// 创建会话的参数
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub text: String,
    pub voice: String,
    pub persistent: bool,
    pub name: Option<String>,
    pub ttl: Option<Duration>,
    pub metadata: Option<SessionMetadata>,
}

impl NewSession {
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            ..Default::default()
        }
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_metadata(mut self, metadata: SessionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// 创建时的非致命提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateWarning {
    /// 请求持久会话但持久后端不可用，已降级为临时会话
    PersistenceDowngraded { reason: String },
}

/// 创建结果
#[derive(Debug, Clone)]
pub struct SessionCreated {
    pub record: SessionRecord,
    pub warning: Option<CreateWarning>,
}

impl SessionCreated {
    pub fn is_downgraded(&self) -> bool {
        matches!(
            self.warning,
            Some(CreateWarning::PersistenceDowngraded { .. })
        )
    }
}

/// 会话统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub ephemeral_total: u64,
    pub ephemeral_active: u64,
    pub ephemeral_expired: u64,
    pub persistent_total: u64,
    pub default_ttl_secs: i64,
    pub durable_available: bool,
}

type MaterializeResult = Result<SessionRecord, BrokerError>;

pub struct SessionStore {
    inner: Arc<StoreInner>,
    flights: SingleFlight<Uuid, MaterializeResult>,
}

struct StoreInner {
    ephemeral: Arc<dyn SessionBackend>,
    durable: Option<Arc<dyn SessionBackend>>,
    segmenter: Arc<dyn Segmenter>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl SessionStore {
    /// `durable` 为 None 表示持久后端在启动时不可用
    pub fn new(
        ephemeral: Arc<dyn SessionBackend>,
        durable: Option<Arc<dyn SessionBackend>>,
        segmenter: Arc<dyn Segmenter>,
        clock: Arc<dyn Clock>,
        default_ttl: Duration,
    ) -> Self {
        tracing::info!(
            ephemeral = ephemeral.name(),
            durable = durable.as_ref().map(|b| b.name()).unwrap_or("unavailable"),
            default_ttl_secs = default_ttl.num_seconds(),
            "SessionStore initialized"
        );

        Self {
            inner: Arc::new(StoreInner {
                ephemeral,
                durable,
                segmenter,
                clock,
                default_ttl,
            }),
            flights: SingleFlight::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn durable_available(&self) -> bool {
        self.inner.durable.is_some()
    }

    /// 创建会话
    pub async fn create(&self, request: NewSession) -> Result<SessionCreated, BrokerError> {
        if request.text.trim().is_empty() {
            return Err(BrokerError::invalid("text must not be empty"));
        }
        validate_voice_id(&request.voice).map_err(BrokerError::InvalidArgument)?;
        let ttl = request.ttl.unwrap_or(self.inner.default_ttl);
        if ttl <= Duration::zero() {
            return Err(BrokerError::invalid("ttl must be positive"));
        }

        let now = self.inner.clock.now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| BrokerError::invalid("ttl is out of range"))?;
        let mut record = SessionRecord {
            session_id: Uuid::new_v4(),
            text: request.text,
            voice: request.voice.trim().to_string(),
            segmentation: None,
            persistent: request.persistent,
            name: request.name,
            created_at: now,
            expires_at: None,
            metadata: request.metadata.unwrap_or_default(),
        };

        let mut warning = None;
        if record.persistent {
            match &self.inner.durable {
                Some(durable) => match durable.save(&record).await {
                    Ok(()) => {
                        tracing::info!(session_id = %record.session_id, backend = durable.name(), "Persistent session created");
                        return Ok(SessionCreated {
                            record,
                            warning: None,
                        });
                    }
                    Err(e) => {
                        warning = Some(CreateWarning::PersistenceDowngraded {
                            reason: e.to_string(),
                        });
                    }
                },
                None => {
                    warning = Some(CreateWarning::PersistenceDowngraded {
                        reason: "durable backend not configured".to_string(),
                    });
                }
            }

            if let Some(CreateWarning::PersistenceDowngraded { reason }) = &warning {
                tracing::warn!(session_id = %record.session_id, reason = %reason, "Persistent session downgraded to ephemeral");
            }
            record.persistent = false;
        }

        record.expires_at = Some(expires_at);
        self.inner.ephemeral.save(&record).await?;
        tracing::info!(
            session_id = %record.session_id,
            ttl_secs = ttl.num_seconds(),
            "Ephemeral session created"
        );

        Ok(SessionCreated { record, warning })
    }

    /// 获取会话；已过期的临时会话视为不存在并立即删除
    pub async fn get(&self, session_id: Uuid) -> Result<SessionRecord, BrokerError> {
        self.inner.get(session_id).await
    }

    pub async fn exists(&self, session_id: Uuid) -> Result<bool, BrokerError> {
        match self.inner.get(session_id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 物化分词结果；已物化时原样返回，并发调用只触发一次分词
    pub async fn materialize_segmentation(
        &self,
        session_id: Uuid,
    ) -> Result<SessionRecord, BrokerError> {
        let record = self.inner.get(session_id).await?;
        if record.segmentation.is_some() {
            return Ok(record);
        }

        let inner = Arc::clone(&self.inner);
        let outcome = self
            .flights
            .run(session_id, move || async move {
                inner.materialize(session_id).await
            })
            .await
            .map_err(|e| BrokerError::internal(e.to_string()))?;

        if !outcome.leader {
            tracing::debug!(session_id = %session_id, "Joined in-flight segmentation");
        }
        outcome.value
    }

    /// 删除会话；不存在时不报错
    pub async fn delete(&self, session_id: Uuid) -> Result<(), BrokerError> {
        if self.inner.ephemeral.remove(session_id).await? {
            tracing::info!(session_id = %session_id, "Ephemeral session deleted");
            return Ok(());
        }

        if let Some(durable) = &self.inner.durable {
            let removed = durable.remove(session_id).await.map_err(|e| {
                tracing::error!(session_id = %session_id, error = %e, "Durable backend delete failed");
                BrokerError::from(e)
            })?;
            if removed {
                tracing::info!(session_id = %session_id, "Persistent session deleted");
            }
        }
        Ok(())
    }

    /// 分页列出持久会话（临时会话不可批量枚举）
    pub async fn list_persistent(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionSummary>, BrokerError> {
        let Some(durable) = &self.inner.durable else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let records = durable.list(limit, offset).await.map_err(|e| {
            tracing::error!(error = %e, "Durable backend list failed");
            BrokerError::from(e)
        })?;
        Ok(records.iter().map(SessionRecord::summary).collect())
    }

    /// 会话统计
    pub async fn stats(&self) -> Result<SessionStats, BrokerError> {
        let now = self.inner.clock.now();
        let ephemeral = self.inner.ephemeral.counts(now).await?;

        let mut stats = SessionStats {
            ephemeral_total: ephemeral.total,
            ephemeral_active: ephemeral.total.saturating_sub(ephemeral.expired),
            ephemeral_expired: ephemeral.expired,
            persistent_total: 0,
            default_ttl_secs: self.inner.default_ttl.num_seconds(),
            durable_available: false,
        };

        if let Some(durable) = &self.inner.durable {
            match durable.counts(now).await {
                Ok(counts) => {
                    stats.persistent_total = counts.total;
                    stats.durable_available = true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Durable backend count failed");
                }
            }
        }

        Ok(stats)
    }

    /// 删除所有已过期的临时会话，返回删除数量
    pub async fn cleanup_expired(&self) -> Result<usize, BrokerError> {
        let now = self.inner.clock.now();
        let expired = self.inner.ephemeral.expired_ids(now).await?;

        let mut removed = 0;
        for session_id in expired {
            if self
                .inner
                .ephemeral
                .remove_if_expired(session_id, now)
                .await?
            {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed = removed, "Cleaned up expired sessions");
        }
        Ok(removed)
    }

    /// 清空持久后端，返回删除数量
    pub async fn clear_persistent(&self) -> Result<u64, BrokerError> {
        let Some(durable) = &self.inner.durable else {
            return Ok(0);
        };
        let removed = durable.clear().await?;
        tracing::info!(removed = removed, "Persistent sessions cleared");
        Ok(removed)
    }
}

impl StoreInner {
    async fn get(&self, session_id: Uuid) -> Result<SessionRecord, BrokerError> {
        if let Some(record) = self.ephemeral.find(session_id).await? {
            let now = self.clock.now();
            if record.is_expired(now) {
                self.ephemeral.remove_if_expired(session_id, now).await?;
                tracing::debug!(session_id = %session_id, "Session expired on read");
                return Err(BrokerError::not_found("Session", session_id));
            }
            return Ok(record);
        }

        if let Some(durable) = &self.durable {
            let found = durable.find(session_id).await.map_err(|e| {
                tracing::error!(session_id = %session_id, error = %e, "Durable backend read failed");
                BrokerError::from(e)
            })?;
            if let Some(record) = found {
                return Ok(record);
            }
        }

        Err(BrokerError::not_found("Session", session_id))
    }

    fn backend_for(&self, record: &SessionRecord) -> Result<&Arc<dyn SessionBackend>, BrokerError> {
        if !record.persistent {
            return Ok(&self.ephemeral);
        }
        self.durable.as_ref().ok_or_else(|| {
            BrokerError::BackendUnavailable("durable backend not configured".to_string())
        })
    }

    async fn materialize(&self, session_id: Uuid) -> Result<SessionRecord, BrokerError> {
        // 上一轮执行可能已经写入结果
        let mut record = self.get(session_id).await?;
        if record.segmentation.is_some() {
            return Ok(record);
        }

        // 分词是同步计算，放到阻塞线程池
        let segmenter = Arc::clone(&self.segmenter);
        let text = record.text.clone();
        let segments = tokio::task::spawn_blocking(move || segmenter.segment(&text))
            .await
            .map_err(|e| BrokerError::internal(format!("segmentation task failed: {}", e)))?
            .map_err(|e| {
                tracing::warn!(session_id = %session_id, error = %e, "Segmentation failed");
                BrokerError::from(e)
            })?;

        record.segmentation = Some(segments);
        let backend = self.backend_for(&record)?;
        // 分词期间会话可能已被删除或过期，此时不能重新写入
        let updated = backend
            .update(&record, self.clock.now())
            .await
            .map_err(|e| {
                tracing::error!(session_id = %session_id, backend = backend.name(), error = %e, "Failed to persist segmentation");
                BrokerError::from(e)
            })?;
        if !updated {
            tracing::debug!(session_id = %session_id, "Session gone before segmentation was stored");
            return Err(BrokerError::not_found("Session", session_id));
        }

        tracing::debug!(
            session_id = %session_id,
            sentences = record.segmentation.as_ref().map(|s| s.len()).unwrap_or(0),
            "Segmentation materialized"
        );
        Ok(record)
    }
}
