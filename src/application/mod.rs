//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（SynthesisGateway、Segmenter、SessionBackend、AudioPayloadStore 等）
//! - services: AudioCacheStore、VoiceCatalogCache、SessionStore
//! - error: 应用层错误定义

pub mod error;
pub mod ports;
pub mod services;

pub use error::BrokerError;

pub use ports::{
    // Audio payload store
    AudioPayloadStore,
    CacheError,
    // Clock
    Clock,
    ManualClock,
    SystemClock,
    // Segmenter
    SegmentationError,
    Segmenter,
    // Session backend
    BackendCounts,
    SessionBackend,
    SessionBackendError,
    // Synthesis gateway
    SynthesisError,
    SynthesisGateway,
    VoiceCatalogSource,
};

pub use services::{
    AudioCacheConfig, AudioCacheStore, CacheStats, CreateWarning, NewSession, PreloadReport,
    SessionCreated, SessionStats, SessionStore, VoiceCatalogCache,
};
