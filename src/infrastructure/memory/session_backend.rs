//! In-Memory Session Backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::application::ports::{BackendCounts, SessionBackend, SessionBackendError};
use crate::domain::SessionRecord;

/// 内存会话表（临时会话）
pub struct InMemorySessionBackend {
    sessions: DashMap<Uuid, SessionRecord>,
}

impl InMemorySessionBackend {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for InMemorySessionBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionBackend for InMemorySessionBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionBackendError> {
        self.sessions.insert(record.session_id, record.clone());
        Ok(())
    }

    async fn update(
        &self,
        record: &SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionBackendError> {
        match self.sessions.get_mut(&record.session_id) {
            Some(mut existing) if !existing.is_expired(now) => {
                *existing = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find(&self, id: Uuid) -> Result<Option<SessionRecord>, SessionBackendError> {
        Ok(self.sessions.get(&id).map(|s| s.clone()))
    }

    async fn remove(&self, id: Uuid) -> Result<bool, SessionBackendError> {
        Ok(self.sessions.remove(&id).is_some())
    }

    async fn remove_if_expired(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionBackendError> {
        let removed = self
            .sessions
            .remove_if(&id, |_, session| session.is_expired(now));
        if removed.is_some() {
            tracing::debug!(session_id = %id, "Expired session removed");
        }
        Ok(removed.is_some())
    }

    async fn expired_ids(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, SessionBackendError> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.is_expired(now))
            .map(|s| *s.key())
            .collect())
    }

    async fn list(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionRecord>, SessionBackendError> {
        let mut sessions: Vec<SessionRecord> =
            self.sessions.iter().map(|s| s.value().clone()).collect();
        sessions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(sessions.into_iter().skip(offset).take(limit).collect())
    }

    async fn counts(&self, now: DateTime<Utc>) -> Result<BackendCounts, SessionBackendError> {
        let mut counts = BackendCounts::default();
        for session in self.sessions.iter() {
            counts.total += 1;
            if session.is_expired(now) {
                counts.expired += 1;
            }
        }
        Ok(counts)
    }

    async fn clear(&self) -> Result<u64, SessionBackendError> {
        let count = self.sessions.len() as u64;
        self.sessions.clear();
        Ok(count)
    }
}
