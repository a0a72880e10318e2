//! ttsbroker - TTS 请求代理
//!
//! 架构设计: Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - 缓存 key 派生、合成请求、会话记录、音色描述
//!
//! 应用层 (application/):
//! - Ports: 端口定义（SynthesisGateway, Segmenter, SessionBackend, AudioPayloadStore, Clock）
//! - Services: AudioCacheStore, VoiceCatalogCache, SessionStore
//!
//! 基础设施层 (infrastructure/):
//! - Memory: 临时会话表、内存音频存储
//! - Persistence: Sled 音频存储 + SQLite 持久会话
//! - Adapters: HTTP 合成网关、默认分词器
//! - Worker: 后台过期清扫

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
