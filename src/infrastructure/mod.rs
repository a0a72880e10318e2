//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现

pub mod adapters;
pub mod memory;
pub mod persistence;
pub mod worker;

pub use adapters::{FakeSynthesisGateway, HttpSynthesisGateway, PunctuationSegmenter};
pub use memory::{InMemoryAudioStore, InMemorySessionBackend};
pub use persistence::{SledAudioStore, SqliteSessionBackend};
pub use worker::{PeriodicSweeper, Sweep, SweeperHandle};
