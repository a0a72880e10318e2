//! Periodic Sweeper - 后台过期清扫
//!
//! 每个清扫任务独立运行在 tokio 任务中，持有自己的 CancellationToken；
//! 清扫逐条获取与前台相同的按 key 锁，不持有全局锁。

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::error::BrokerError;
use crate::application::services::{AudioCacheStore, SessionStore};

/// 可周期执行的清扫
#[async_trait]
pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;

    /// 执行一次清扫，返回删除数量
    async fn sweep(&self) -> Result<usize, BrokerError>;
}

#[async_trait]
impl Sweep for AudioCacheStore {
    fn name(&self) -> &'static str {
        "audio_cache"
    }

    async fn sweep(&self) -> Result<usize, BrokerError> {
        Ok(self.clear_expired().await)
    }
}

#[async_trait]
impl Sweep for SessionStore {
    fn name(&self) -> &'static str {
        "sessions"
    }

    async fn sweep(&self) -> Result<usize, BrokerError> {
        self.cleanup_expired().await
    }
}

/// 后台清扫器
pub struct PeriodicSweeper {
    sweep: Arc<dyn Sweep>,
    interval: Duration,
    token: CancellationToken,
}

/// 运行中的清扫任务
pub struct SweeperHandle {
    name: &'static str,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// 取消并等待任务退出
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            tracing::error!(sweep = self.name, error = %e, "Sweeper task panicked");
        }
    }
}

impl PeriodicSweeper {
    pub fn new(sweep: Arc<dyn Sweep>, interval: Duration) -> Self {
        Self {
            sweep,
            interval,
            token: CancellationToken::new(),
        }
    }

    /// 使用外部 token（例如进程级关闭信号的子 token）
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// 在后台启动
    pub fn spawn(self) -> SweeperHandle {
        let name = self.sweep.name();
        let token = self.token.clone();
        let join = tokio::spawn(self.run());
        SweeperHandle { name, token, join }
    }

    /// 运行直到被取消
    pub async fn run(self) {
        let name = self.sweep.name();
        tracing::info!(
            sweep = name,
            interval_secs = self.interval.as_secs_f64(),
            "Sweeper started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即完成，跳过
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sweep.sweep().await {
                        Ok(0) => tracing::debug!(sweep = name, "Sweep found nothing to remove"),
                        Ok(removed) => tracing::info!(sweep = name, removed = removed, "Sweep completed"),
                        Err(e) => tracing::error!(sweep = name, error = %e, "Sweep failed"),
                    }
                }
            }
        }

        tracing::info!(sweep = name, "Sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSweep {
        runs: AtomicUsize,
        failing: bool,
    }

    #[async_trait]
    impl Sweep for CountingSweep {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn sweep(&self) -> Result<usize, BrokerError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.failing {
                Err(BrokerError::BackendUnavailable("down".to_string()))
            } else {
                Ok(1)
            }
        }
    }

    fn counting(failing: bool) -> Arc<CountingSweep> {
        Arc::new(CountingSweep {
            runs: AtomicUsize::new(0),
            failing,
        })
    }

    #[tokio::test]
    async fn test_runs_periodically_until_shutdown() {
        let sweep = counting(false);
        let handle = PeriodicSweeper::new(sweep.clone(), Duration::from_millis(20)).spawn();

        tokio::time::sleep(Duration::from_millis(130)).await;
        handle.shutdown().await;

        let runs = sweep.runs.load(Ordering::SeqCst);
        assert!(runs >= 2, "expected at least 2 runs, got {}", runs);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sweep.runs.load(Ordering::SeqCst), runs);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let sweep = counting(true);
        let handle = PeriodicSweeper::new(sweep.clone(), Duration::from_millis(20)).spawn();

        tokio::time::sleep(Duration::from_millis(130)).await;
        handle.shutdown().await;
        assert!(sweep.runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_no_sweep_before_first_interval() {
        let sweep = counting(false);
        let handle = PeriodicSweeper::new(sweep.clone(), Duration::from_secs(3600)).spawn();

        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.shutdown().await;
        assert_eq!(sweep.runs.load(Ordering::SeqCst), 0);
    }
}
