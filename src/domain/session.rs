//! Session 领域模型
//!
//! 会话保存用户提交的文本、所选音色与分词结果

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 开放式元数据（字符串 -> 任意 JSON 值）
pub type SessionMetadata = serde_json::Map<String, serde_json::Value>;

/// 一个句子及其分词
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceSegment {
    pub sentence: String,
    pub words: Vec<String>,
}

/// 分词物化状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationState {
    Pending,
    Materialized,
}

/// 会话记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub text: String,
    pub voice: String,
    #[serde(default)]
    pub segmentation: Option<Vec<SentenceSegment>>,
    pub persistent: bool,
    #[serde(default)]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// None 表示永不过期
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now > at).unwrap_or(false)
    }

    pub fn segmentation_state(&self) -> SegmentationState {
        if self.segmentation.is_some() {
            SegmentationState::Materialized
        } else {
            SegmentationState::Pending
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from(self)
    }
}

/// 会话摘要（用于列表）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub name: Option<String>,
    pub voice: String,
    /// 文本前 50 个字符
    pub preview: String,
    pub char_count: usize,
    pub sentence_count: Option<usize>,
    pub created_at: DateTime<Utc>,
}

const PREVIEW_CHARS: usize = 50;

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            session_id: record.session_id,
            name: record.name.clone(),
            voice: record.voice.clone(),
            preview: record.text.chars().take(PREVIEW_CHARS).collect(),
            char_count: record.text.chars().count(),
            sentence_count: record.segmentation.as_ref().map(|s| s.len()),
            created_at: record.created_at,
        }
    }
}
