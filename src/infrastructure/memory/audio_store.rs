//! In-Memory Audio Payload Store

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::application::ports::{AudioPayloadStore, CacheError};
use crate::domain::{AudioCacheEntry, CacheKey};

/// 内存音频存储（进程退出即丢失）
pub struct InMemoryAudioStore {
    entries: DashMap<CacheKey, (AudioCacheEntry, Vec<u8>)>,
}

impl InMemoryAudioStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryAudioStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioPayloadStore for InMemoryAudioStore {
    async fn load_index(&self) -> Result<Vec<AudioCacheEntry>, CacheError> {
        Ok(self.entries.iter().map(|e| e.value().0.clone()).collect())
    }

    fn payload_location(&self, key: &CacheKey) -> String {
        format!("memory:{}", key)
    }

    async fn write(&self, entry: &AudioCacheEntry, payload: &[u8]) -> Result<(), CacheError> {
        self.entries
            .insert(entry.key.clone(), (entry.clone(), payload.to_vec()));
        Ok(())
    }

    async fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).map(|e| e.value().1.clone()))
    }

    async fn update_entry(&self, entry: &AudioCacheEntry) -> Result<(), CacheError> {
        if let Some(mut stored) = self.entries.get_mut(&entry.key) {
            stored.0 = entry.clone();
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }
}
