//! 音频缓存条目

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::cache_key::{CacheKey, SynthesisRequest};

/// 生成该条目的请求摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub voice: String,
    pub rate: String,
    pub volume: String,
    pub pitch: String,
    pub text_length: usize,
}

impl From<&SynthesisRequest> for RequestSummary {
    fn from(request: &SynthesisRequest) -> Self {
        Self {
            voice: request.voice.clone(),
            rate: request.rate.clone(),
            volume: request.volume.clone(),
            pitch: request.pitch.clone(),
            text_length: request.text.trim().chars().count(),
        }
    }
}

/// 音频缓存条目元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioCacheEntry {
    pub key: CacheKey,
    pub byte_length: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// 负载在存储中的位置（由存储实现决定）
    pub payload_location: String,
    pub access_count: u64,
    pub request: Option<RequestSummary>,
}

impl AudioCacheEntry {
    pub fn new(
        key: CacheKey,
        byte_length: u64,
        now: DateTime<Utc>,
        ttl: Duration,
        request: Option<RequestSummary>,
    ) -> Self {
        Self {
            key,
            byte_length,
            created_at: now,
            last_accessed_at: now,
            // 超出时间范围时视为永不过期
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            payload_location: String::new(),
            access_count: 0,
            request,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// LRU touch
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
        self.access_count += 1;
    }
}

/// 缓存条目信息（用于诊断列表）
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub cache_key: CacheKey,
    pub byte_length: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub is_expired: bool,
    pub request: Option<RequestSummary>,
}

impl CacheEntryInfo {
    pub fn from_entry(entry: &AudioCacheEntry, now: DateTime<Utc>) -> Self {
        Self {
            cache_key: entry.key.clone(),
            byte_length: entry.byte_length,
            created_at: entry.created_at,
            last_accessed_at: entry.last_accessed_at,
            expires_at: entry.expires_at,
            access_count: entry.access_count,
            is_expired: entry.is_expired(now),
            request: entry.request.clone(),
        }
    }
}
