//! Worker Layer - Background Task Processing
//!
//! 实现 PeriodicSweeper，定期清理过期的缓存条目和会话

mod sweeper;

pub use sweeper::{PeriodicSweeper, Sweep, SweeperHandle};
