//! Audio Payload Store Port - 音频缓存存储
//!
//! 定义音频负载与元数据索引的抽象存储，具体实现使用 Sled 或内存

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AudioCacheEntry, CacheKey};

/// Audio Cache 存储错误
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Audio Payload Store Port
///
/// 每个缓存 key 一份负载 + 一条元数据索引记录。
/// 淘汰、过期、字节统计由上层 `AudioCacheStore` 负责，存储只做读写。
#[async_trait]
pub trait AudioPayloadStore: Send + Sync {
    /// 读取全部元数据索引（启动时重建内存索引）
    async fn load_index(&self) -> Result<Vec<AudioCacheEntry>, CacheError>;

    /// 负载在存储中的位置描述
    fn payload_location(&self, key: &CacheKey) -> String;

    /// 写入负载与元数据
    async fn write(&self, entry: &AudioCacheEntry, payload: &[u8]) -> Result<(), CacheError>;

    /// 读取负载
    async fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// 仅更新元数据（LRU touch）
    async fn update_entry(&self, entry: &AudioCacheEntry) -> Result<(), CacheError>;

    /// 删除负载与元数据
    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// 清空存储
    async fn clear(&self) -> Result<(), CacheError>;

    /// 刷盘
    async fn flush(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
