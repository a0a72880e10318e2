//! Sled-based Audio Payload Store
//!
//! 一个 sled 库内用前缀区分两类记录：
//! - `payload:{key}` 原始音频字节
//! - `entry:{key}`   bincode 编码的 `AudioCacheEntry`

use async_trait::async_trait;
use sled::Db;
use std::path::Path;
use std::sync::Arc;

use crate::application::ports::{AudioPayloadStore, CacheError};
use crate::domain::{AudioCacheEntry, CacheKey};

const PAYLOAD_PREFIX: &str = "payload:";
const ENTRY_PREFIX: &str = "entry:";

/// Sled 存储配置
#[derive(Debug, Clone)]
pub struct SledStoreConfig {
    /// 数据库路径
    pub db_path: String,
}

impl Default for SledStoreConfig {
    fn default() -> Self {
        Self {
            db_path: "data/cache".to_string(),
        }
    }
}

/// Sled 音频存储
pub struct SledAudioStore {
    db: Db,
    db_path: String,
}

impl SledAudioStore {
    /// 创建新的存储实例
    pub fn new(config: &SledStoreConfig) -> Result<Self, CacheError> {
        let db = sled::open(&config.db_path)
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;

        tracing::info!(db_path = %config.db_path, "SledAudioStore opened");

        Ok(Self {
            db,
            db_path: config.db_path.clone(),
        })
    }

    /// 打开现有存储
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let config = SledStoreConfig {
            db_path: path.as_ref().to_string_lossy().to_string(),
        };
        Self::new(&config)
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn payload_key(key: &CacheKey) -> String {
        format!("{}{}", PAYLOAD_PREFIX, key)
    }

    fn entry_key(key: &CacheKey) -> String {
        format!("{}{}", ENTRY_PREFIX, key)
    }

    fn encode(entry: &AudioCacheEntry) -> Result<Vec<u8>, CacheError> {
        bincode::serialize(entry).map_err(|e| CacheError::SerializationError(e.to_string()))
    }
}

#[async_trait]
impl AudioPayloadStore for SledAudioStore {
    async fn load_index(&self) -> Result<Vec<AudioCacheEntry>, CacheError> {
        let mut entries = Vec::new();
        for item in self.db.scan_prefix(ENTRY_PREFIX) {
            let (key, value) = item.map_err(|e| CacheError::DatabaseError(e.to_string()))?;
            match bincode::deserialize::<AudioCacheEntry>(&value) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        key = %String::from_utf8_lossy(&key),
                        error = %e,
                        "Skipping corrupt cache index record"
                    );
                }
            }
        }

        tracing::debug!(db_path = %self.db_path, entries = entries.len(), "Cache index loaded");
        Ok(entries)
    }

    fn payload_location(&self, key: &CacheKey) -> String {
        format!("sled:{}#{}", self.db_path, Self::payload_key(key))
    }

    async fn write(&self, entry: &AudioCacheEntry, payload: &[u8]) -> Result<(), CacheError> {
        let entry_bytes = Self::encode(entry)?;

        // 先写负载，再写索引：索引存在即意味着负载已写入
        self.db
            .insert(Self::payload_key(&entry.key), payload)
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;
        self.db
            .insert(Self::entry_key(&entry.key), entry_bytes)
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        self.db
            .get(Self::payload_key(key))
            .map(|data| data.map(|bytes| bytes.to_vec()))
            .map_err(|e| CacheError::DatabaseError(e.to_string()))
    }

    async fn update_entry(&self, entry: &AudioCacheEntry) -> Result<(), CacheError> {
        let entry_bytes = Self::encode(entry)?;
        self.db
            .insert(Self::entry_key(&entry.key), entry_bytes)
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.db
            .remove(Self::entry_key(key))
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;
        self.db
            .remove(Self::payload_key(key))
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.db
            .clear()
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.db
            .flush_async()
            .await
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}
