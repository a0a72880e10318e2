//! Memory Layer - 进程内存储
//!
//! 临时会话表与内存音频存储

mod audio_store;
mod session_backend;

pub use audio_store::InMemoryAudioStore;
pub use session_backend::InMemorySessionBackend;
