//! Single-flight - 同 key 的并发调用共享一次执行
//!
//! 生产者在独立的 tokio 任务中运行：等待方放弃等待不会取消生产者，
//! 结果依然会被写入缓存供下一个调用方使用。

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;

/// 生产者任务异常终止
#[derive(Debug, Clone, Error)]
#[error("In-flight call aborted: {0}")]
pub struct FlightAborted(pub String);

type Flight<V> = Shared<BoxFuture<'static, Result<V, FlightAborted>>>;

/// 生产者结束时移除自己的表项；任务 panic 展开时同样生效
struct RemoveOnDrop<K, V>
where
    K: Eq + Hash,
{
    calls: Arc<DashMap<K, Flight<V>>>,
    key: K,
}

impl<K, V> Drop for RemoveOnDrop<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.calls.remove(&self.key);
    }
}

/// 一次调用的结果
#[derive(Debug, Clone)]
pub struct FlightOutcome<V> {
    pub value: V,
    /// 是否由本次调用发起执行（false 表示加入了已有的执行）
    pub leader: bool,
}

pub struct SingleFlight<K, V>
where
    K: Eq + Hash,
{
    calls: Arc<DashMap<K, Flight<V>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Arc::new(DashMap::new()),
        }
    }

    /// 当前正在执行的 key 数量
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }

    /// 执行或加入 `key` 对应的调用
    ///
    /// `make` 只在本次调用成为 leader 时被调用。
    pub async fn run<F, Fut>(&self, key: K, make: F) -> Result<FlightOutcome<V>, FlightAborted>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (flight, leader) = match self.calls.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let producer = make();
                let guard = RemoveOnDrop {
                    calls: Arc::clone(&self.calls),
                    key,
                };
                let handle = tokio::spawn(async move {
                    let value = producer.await;
                    // 先移除再返回：之后到达的调用会发起新的执行
                    drop(guard);
                    value
                });
                let flight = async move {
                    handle
                        .await
                        .map_err(|e| FlightAborted(e.to_string()))
                }
                .boxed()
                .shared();
                entry.insert(flight.clone());
                (flight, true)
            }
        };

        let value = flight.await?;
        Ok(FlightOutcome { value, leader })
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_share_one_execution() {
        let flights: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let flights = flights.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flights
                    .run("k".to_string(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        42
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut leaders = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert_eq!(outcome.value, 42);
            if outcome.leader {
                leaders += 1;
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(leaders, 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_execute_again() {
        let flights: SingleFlight<&'static str, u32> = SingleFlight::new();
        let first = flights.run("k", || async { 1 }).await.unwrap();
        let second = flights.run("k", || async { 2 }).await.unwrap();
        assert_eq!(first.value, 1);
        assert_eq!(second.value, 2);
        assert!(second.leader);
    }

    #[tokio::test]
    async fn test_panicked_producer_does_not_block_key() {
        let flights: SingleFlight<&'static str, u32> = SingleFlight::new();
        let explode = true;

        let first = flights
            .run("k", move || async move {
                if explode {
                    panic!("producer crashed");
                }
                1
            })
            .await;
        assert!(first.is_err());
        assert_eq!(flights.in_flight(), 0);

        let second = flights.run("k", || async { 2 }).await.unwrap();
        assert_eq!(second.value, 2);
        assert!(second.leader);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_cancel_producer() {
        let flights: Arc<SingleFlight<&'static str, u32>> = Arc::new(SingleFlight::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let done = finished.clone();
        let waiter = {
            let flights = flights.clone();
            tokio::spawn(async move {
                flights
                    .run("k", || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        done.fetch_add(1, Ordering::SeqCst);
                        7
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.abort();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }
}
