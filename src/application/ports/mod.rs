//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_cache;
mod clock;
mod session_backend;
mod text_segmenter;
mod tts_engine;

pub use audio_cache::{AudioPayloadStore, CacheError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use session_backend::{BackendCounts, SessionBackend, SessionBackendError};
pub use text_segmenter::{SegmentationError, Segmenter};
pub use tts_engine::{SynthesisError, SynthesisGateway, VoiceCatalogSource};
