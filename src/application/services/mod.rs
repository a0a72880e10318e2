//! Application Services - 缓存与会话服务
//!
//! 服务在进程启动时构造一次，通过 Arc 注入调用方

mod audio_cache;
mod session_store;
mod single_flight;
mod voice_catalog;

pub use audio_cache::{AudioCacheConfig, AudioCacheStore, CacheStats, PreloadReport};
pub use session_store::{
    CreateWarning, NewSession, SessionCreated, SessionStats, SessionStore,
    DEFAULT_SESSION_TTL_SECS,
};
pub use single_flight::{FlightAborted, FlightOutcome, SingleFlight};
pub use voice_catalog::{VoiceCatalogCache, DEFAULT_VOICE_TTL_SECS};
