//! Domain Layer - 领域层
//!
//! 纯数据类型与纯函数:
//! - 缓存 key 派生与合成请求
//! - 音频缓存条目
//! - 会话记录与分词结构
//! - 音色描述

mod audio;
mod cache_key;
mod session;
mod voice;

pub use audio::{AudioCacheEntry, CacheEntryInfo, RequestSummary};
pub use cache_key::{
    derive_cache_key, validate_voice_id, CacheKey, SynthesisRequest, DEFAULT_PITCH, DEFAULT_RATE,
    DEFAULT_VOLUME,
};
pub use session::{
    SegmentationState, SentenceSegment, SessionMetadata, SessionRecord, SessionSummary,
};
pub use voice::VoiceDescriptor;
