//! Sled Persistence - 音频缓存负载存储

mod audio_cache;

pub use audio_cache::{SledAudioStore, SledStoreConfig};
