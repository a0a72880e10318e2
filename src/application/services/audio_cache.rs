//! Audio Cache Store - 合成音频的分层缓存
//!
//! - 内存索引（DashMap，按 key 分片加锁）记录元数据与字节统计
//! - 负载与索引持久化在 `AudioPayloadStore`（Sled 或内存）
//! - 未命中时由 single-flight 保证同一 key 同时只有一次合成
//! - 每次写入后同步执行 LRU 淘汰；过期在读取时惰性检查，并由后台清扫

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::single_flight::SingleFlight;
use crate::application::error::BrokerError;
use crate::application::ports::{AudioPayloadStore, Clock, SynthesisError, SynthesisGateway};
use crate::domain::{AudioCacheEntry, CacheEntryInfo, CacheKey, RequestSummary, SynthesisRequest};

/// 音频缓存配置
#[derive(Debug, Clone)]
pub struct AudioCacheConfig {
    /// 最大缓存大小（字节）
    pub max_size_bytes: u64,
    /// 默认过期时间
    pub default_ttl: Duration,
}

impl Default for AudioCacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 500 * 1024 * 1024, // 500MB
            default_ttl: Duration::days(7),
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
    pub current_size_bytes: u64,
    pub max_size_bytes: u64,
    pub entry_count: usize,
}

/// 预热结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub requested: usize,
    pub warmed: usize,
    pub failed: usize,
}

type FlightResult = Result<Arc<Vec<u8>>, BrokerError>;

/// TTL 必须为正，且 `now + ttl` 不能超出时间范围
fn check_ttl(ttl: Duration, now: DateTime<Utc>) -> Result<(), BrokerError> {
    if ttl <= Duration::zero() {
        return Err(BrokerError::invalid("ttl must be positive"));
    }
    if now.checked_add_signed(ttl).is_none() {
        return Err(BrokerError::invalid("ttl is out of range"));
    }
    Ok(())
}

/// 音频缓存
pub struct AudioCacheStore {
    inner: Arc<CacheInner>,
    flights: SingleFlight<CacheKey, FlightResult>,
}

struct CacheInner {
    store: Arc<dyn AudioPayloadStore>,
    index: DashMap<CacheKey, AudioCacheEntry>,
    current_size: AtomicU64,
    max_size_bytes: u64,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    total_requests: AtomicU64,
}

impl AudioCacheStore {
    /// 打开缓存，从存储的索引重建内存状态
    pub async fn open(
        store: Arc<dyn AudioPayloadStore>,
        config: AudioCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BrokerError> {
        if config.max_size_bytes == 0 {
            return Err(BrokerError::invalid("max_size_bytes must be greater than 0"));
        }
        check_ttl(config.default_ttl, clock.now())?;

        let entries = store.load_index().await?;
        let index = DashMap::with_capacity(entries.len());
        let mut current_size = 0u64;
        for entry in entries {
            current_size += entry.byte_length;
            index.insert(entry.key.clone(), entry);
        }

        tracing::info!(
            entries = index.len(),
            current_size = current_size,
            max_size_bytes = config.max_size_bytes,
            default_ttl_secs = config.default_ttl.num_seconds(),
            "AudioCacheStore initialized"
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                store,
                index,
                current_size: AtomicU64::new(current_size),
                max_size_bytes: config.max_size_bytes,
                default_ttl: config.default_ttl,
                clock,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                total_requests: AtomicU64::new(0),
            }),
            flights: SingleFlight::new(),
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// 命中则返回缓存，否则调用 `synthesize` 并以默认 TTL 缓存结果
    pub async fn get_or_synthesize<F, Fut>(
        &self,
        key: &CacheKey,
        synthesize: F,
    ) -> Result<Vec<u8>, BrokerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<u8>, SynthesisError>> + Send + 'static,
    {
        self.fetch(key, self.inner.default_ttl, None, synthesize)
            .await
    }

    /// 同 `get_or_synthesize`，使用指定 TTL
    pub async fn get_or_synthesize_with_ttl<F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        synthesize: F,
    ) -> Result<Vec<u8>, BrokerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<u8>, SynthesisError>> + Send + 'static,
    {
        check_ttl(ttl, self.inner.clock.now())?;
        self.fetch(key, ttl, None, synthesize).await
    }

    /// 校验请求、派生 key，并通过网关完成缓存读取或合成
    pub async fn synthesize(
        &self,
        gateway: Arc<dyn SynthesisGateway>,
        request: SynthesisRequest,
    ) -> Result<Vec<u8>, BrokerError> {
        self.synthesize_with_ttl(gateway, request, self.inner.default_ttl)
            .await
    }

    async fn synthesize_with_ttl(
        &self,
        gateway: Arc<dyn SynthesisGateway>,
        request: SynthesisRequest,
        ttl: Duration,
    ) -> Result<Vec<u8>, BrokerError> {
        request.validate().map_err(BrokerError::InvalidArgument)?;
        check_ttl(ttl, self.inner.clock.now())?;

        let key = request.cache_key();
        let summary = RequestSummary::from(&request);
        self.fetch(&key, ttl, Some(summary), move || async move {
            gateway.synthesize(&request).await
        })
        .await
    }

    /// 预热缓存，结果丢弃；单个失败只记录日志
    pub async fn preload(
        &self,
        gateway: Arc<dyn SynthesisGateway>,
        requests: Vec<SynthesisRequest>,
        ttl: Option<Duration>,
    ) -> PreloadReport {
        let ttl = ttl.unwrap_or(self.inner.default_ttl);
        let requested = requests.len();

        let results = join_all(
            requests
                .into_iter()
                .map(|request| self.synthesize_with_ttl(gateway.clone(), request, ttl)),
        )
        .await;

        let mut report = PreloadReport {
            requested,
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(_) => report.warmed += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "Preload request failed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            requested = report.requested,
            warmed = report.warmed,
            failed = report.failed,
            "Cache preload finished"
        );
        report
    }

    async fn fetch<F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        request: Option<RequestSummary>,
        synthesize: F,
    ) -> Result<Vec<u8>, BrokerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<u8>, SynthesisError>> + Send + 'static,
    {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);

        if let Some(payload) = self.inner.lookup(key).await {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(cache_key = %key.short(), "Cache hit");
            return Ok((*payload).clone());
        }
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(cache_key = %key.short(), "Cache miss");

        let inner = Arc::clone(&self.inner);
        let flight_key = key.clone();
        let outcome = self
            .flights
            .run(key.clone(), move || async move {
                // 上一轮执行可能在本次检查之后刚刚写入
                if let Some(payload) = inner.lookup(&flight_key).await {
                    return Ok(payload);
                }

                let audio = match synthesize().await {
                    Ok(audio) => audio,
                    Err(e) => {
                        tracing::warn!(cache_key = %flight_key.short(), error = %e, "Synthesis failed");
                        return Err(BrokerError::from(e));
                    }
                };

                let payload = Arc::new(audio);
                inner.insert(flight_key, &payload, ttl, request).await;
                Ok(payload)
            })
            .await
            .map_err(|e| BrokerError::internal(e.to_string()))?;

        if !outcome.leader {
            tracing::debug!(cache_key = %key.short(), "Joined in-flight synthesis");
        }

        outcome.value.map(|payload| (*payload).clone())
    }

    /// 是否存在未过期的条目（不计入统计，不更新访问时间）
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .index
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let total_requests = self.inner.total_requests.load(Ordering::Relaxed);
        let hit_rate = if total_requests > 0 {
            hits as f64 / total_requests as f64
        } else {
            0.0
        };

        CacheStats {
            hits,
            misses,
            total_requests,
            hit_rate,
            current_size_bytes: self.inner.current_size.load(Ordering::Relaxed),
            max_size_bytes: self.inner.max_size_bytes,
            entry_count: self.inner.index.len(),
        }
    }

    /// 列出所有条目，按最近访问时间倒序
    pub fn entries(&self) -> Vec<CacheEntryInfo> {
        let now = self.inner.clock.now();
        let mut items: Vec<CacheEntryInfo> = self
            .inner
            .index
            .iter()
            .map(|entry| CacheEntryInfo::from_entry(entry.value(), now))
            .collect();
        items.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        items
    }

    /// 删除所有条目，命中/未命中计数保持不变
    pub async fn clear(&self) -> usize {
        let keys: Vec<CacheKey> = self.inner.index.iter().map(|e| e.key().clone()).collect();

        let mut removed = 0;
        for key in keys {
            if self.inner.remove_entry_if(&key, |_| true).await {
                removed += 1;
            }
        }

        // 清理索引之外的残留负载
        if let Err(e) = self.inner.store.clear().await {
            tracing::warn!(error = %e, "Failed to clear payload store");
        }
        self.inner.recompute_size();

        tracing::info!(removed = removed, "Audio cache cleared");
        removed
    }

    /// 删除已过期条目，返回删除数量
    pub async fn clear_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let expired: Vec<CacheKey> = self
            .inner
            .index
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if self
                .inner
                .remove_entry_if(&key, |entry| entry.is_expired(now))
                .await
            {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed = removed, "Removed expired cache entries");
        }
        removed
    }

    /// 刷新底层存储
    pub async fn flush(&self) -> Result<(), BrokerError> {
        self.inner.store.flush().await?;
        Ok(())
    }
}

impl CacheInner {
    /// 读取未过期的负载并更新访问时间；过期条目在此惰性删除
    async fn lookup(&self, key: &CacheKey) -> Option<Arc<Vec<u8>>> {
        let now = self.clock.now();
        let expired = self.index.get(key)?.is_expired(now);

        if expired {
            self.remove_entry_if(key, |entry| entry.is_expired(now))
                .await;
            tracing::debug!(cache_key = %key.short(), "Cache entry expired");
            return None;
        }

        match self.store.read(key).await {
            Ok(Some(payload)) => {
                let touched = self.index.get_mut(key).map(|mut entry| {
                    entry.touch(now);
                    entry.value().clone()
                });
                if let Some(entry) = touched {
                    if let Err(e) = self.store.update_entry(&entry).await {
                        tracing::warn!(cache_key = %key.short(), error = %e, "Failed to persist access time");
                    }
                }
                Some(Arc::new(payload))
            }
            Ok(None) => {
                tracing::warn!(cache_key = %key.short(), "Cached payload missing, dropping index entry");
                self.remove_entry_if(key, |_| true).await;
                None
            }
            Err(e) => {
                tracing::warn!(cache_key = %key.short(), error = %e, "Failed to read cached payload");
                None
            }
        }
    }

    /// 写入新条目；写入失败只记录警告，不影响调用方
    async fn insert(
        &self,
        key: CacheKey,
        payload: &[u8],
        ttl: Duration,
        request: Option<RequestSummary>,
    ) {
        let now = self.clock.now();
        let mut entry = AudioCacheEntry::new(key.clone(), payload.len() as u64, now, ttl, request);
        entry.payload_location = self.store.payload_location(&key);

        if let Err(e) = self.store.write(&entry, payload).await {
            tracing::warn!(
                cache_key = %key.short(),
                size_bytes = entry.byte_length,
                error = %e,
                "Cache write failed, returning uncached audio"
            );
            return;
        }

        let size = entry.byte_length;
        if let Some(previous) = self.index.insert(key.clone(), entry) {
            self.release(previous.byte_length);
        }
        self.current_size.fetch_add(size, Ordering::Relaxed);

        tracing::debug!(cache_key = %key.short(), size_bytes = size, "Audio cached");

        self.evict_lru(&key).await;
    }

    /// LRU 淘汰，直到回到预算内；刚写入的条目不参与淘汰
    async fn evict_lru(&self, keep: &CacheKey) -> usize {
        if self.current_size.load(Ordering::Relaxed) <= self.max_size_bytes {
            return 0;
        }

        let mut candidates: Vec<(DateTime<Utc>, CacheKey)> = self
            .index
            .iter()
            .filter(|entry| entry.key() != keep)
            .map(|entry| (entry.last_accessed_at, entry.key().clone()))
            .collect();
        candidates.sort();

        let mut evicted = 0;
        for (_, key) in candidates {
            if self.current_size.load(Ordering::Relaxed) <= self.max_size_bytes {
                break;
            }
            if self.remove_entry_if(&key, |_| true).await {
                evicted += 1;
                tracing::debug!(cache_key = %key.short(), "LRU evicted cache entry");
            }
        }

        if self.current_size.load(Ordering::Relaxed) > self.max_size_bytes {
            tracing::warn!(
                cache_key = %keep.short(),
                current_size = self.current_size.load(Ordering::Relaxed),
                max_size_bytes = self.max_size_bytes,
                "Single entry exceeds cache budget, retained"
            );
        }
        evicted
    }

    /// 过期与淘汰共用的删除逻辑
    async fn remove_entry_if(
        &self,
        key: &CacheKey,
        predicate: impl FnOnce(&AudioCacheEntry) -> bool,
    ) -> bool {
        let Some((key, entry)) = self.index.remove_if(key, |_, entry| predicate(entry)) else {
            return false;
        };

        self.release(entry.byte_length);
        if let Err(e) = self.store.remove(&key).await {
            tracing::warn!(cache_key = %key.short(), error = %e, "Failed to remove cached payload");
        }
        true
    }

    fn release(&self, bytes: u64) {
        let _ = self
            .current_size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    fn recompute_size(&self) {
        let total: u64 = self.index.iter().map(|entry| entry.byte_length).sum();
        self.current_size.store(total, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{CacheError, ManualClock};
    use crate::domain::derive_cache_key;
    use crate::infrastructure::adapters::FakeSynthesisGateway;
    use crate::infrastructure::memory::InMemoryAudioStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    fn key(text: &str) -> CacheKey {
        derive_cache_key(text, "zh-CN-XiaoxiaoNeural", "+0%", "+0%", "+0Hz")
    }

    async fn cache_with(
        store: Arc<dyn AudioPayloadStore>,
        max_size_bytes: u64,
        clock: Arc<ManualClock>,
    ) -> AudioCacheStore {
        let config = AudioCacheConfig {
            max_size_bytes,
            default_ttl: Duration::hours(1),
        };
        AudioCacheStore::open(store, config, clock).await.unwrap()
    }

    async fn memory_cache(max_size_bytes: u64) -> (AudioCacheStore, Arc<ManualClock>) {
        let clock = ManualClock::starting_now();
        let cache = cache_with(InMemoryAudioStore::new().arc(), max_size_bytes, clock.clone()).await;
        (cache, clock)
    }

    /// 计数的合成 thunk
    fn counting(
        calls: &Arc<AtomicUsize>,
        audio: Vec<u8>,
    ) -> impl FnOnce() -> futures_util::future::Ready<Result<Vec<u8>, SynthesisError>> + Send + 'static
    {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures_util::future::ready(Ok(audio))
        }
    }

    /// 写入总是失败的存储
    struct FailingStore;

    #[async_trait]
    impl AudioPayloadStore for FailingStore {
        async fn load_index(&self) -> Result<Vec<AudioCacheEntry>, CacheError> {
            Ok(Vec::new())
        }
        fn payload_location(&self, key: &CacheKey) -> String {
            format!("nowhere:{}", key)
        }
        async fn write(&self, _: &AudioCacheEntry, _: &[u8]) -> Result<(), CacheError> {
            Err(CacheError::IoError("disk full".to_string()))
        }
        async fn read(&self, _: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
            Ok(None)
        }
        async fn update_entry(&self, _: &AudioCacheEntry) -> Result<(), CacheError> {
            Ok(())
        }
        async fn remove(&self, _: &CacheKey) -> Result<(), CacheError> {
            Ok(())
        }
        async fn clear(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_second_call_is_a_hit() {
        let (cache, _) = memory_cache(1024 * 1024).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key("你好");

        let first = cache
            .get_or_synthesize(&k, counting(&calls, vec![1, 2, 3]))
            .await
            .unwrap();
        let second = cache
            .get_or_synthesize(&k, counting(&calls, vec![9, 9, 9]))
            .await
            .unwrap();

        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_requests, 2);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.current_size_bytes, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_callers_trigger_one_synthesis() {
        let (cache, _) = memory_cache(1024 * 1024).await;
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key("重复");

        let mut handles = Vec::new();
        for _ in 0..20 {
            let cache = cache.clone();
            let calls = calls.clone();
            let k = k.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_synthesize(&k, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                        Ok::<_, SynthesisError>(vec![7u8; 16])
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), vec![7u8; 16]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().entry_count, 1);
    }

    #[tokio::test]
    async fn test_different_keys_are_independent() {
        let (cache, _) = memory_cache(1024 * 1024).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let (k1, k2) = (key("一"), key("二"));
        let (a, b) = tokio::join!(
            cache.get_or_synthesize(&k1, counting(&calls, vec![1])),
            cache.get_or_synthesize(&k2, counting(&calls, vec![2])),
        );
        assert_eq!(a.unwrap(), vec![1]);
        assert_eq!(b.unwrap(), vec![2]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_rejected() {
        let (cache, _) = memory_cache(1024 * 1024).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let err = cache
            .get_or_synthesize_with_ttl(
                &key("太久"),
                Duration::days(365 * 300_000),
                counting(&calls, vec![1]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidArgument(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().total_requests, 0);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let (cache, _) = memory_cache(1024 * 1024).await;
        let k = key("失败");

        let err = cache
            .get_or_synthesize(&k, || async {
                Err::<Vec<u8>, _>(SynthesisError::SynthesisFailure("boom".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::UpstreamFailure(_)));
        assert!(!cache.contains(&k));
        assert_eq!(cache.stats().entry_count, 0);

        let calls = Arc::new(AtomicUsize::new(0));
        let audio = cache
            .get_or_synthesize(&k, counting(&calls, vec![4, 2]))
            .await
            .unwrap();
        assert_eq!(audio, vec![4, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_failure_still_returns_audio() {
        let clock = ManualClock::starting_now();
        let cache = cache_with(Arc::new(FailingStore), 1024, clock).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key("写失败");

        let audio = cache
            .get_or_synthesize(&k, counting(&calls, vec![5; 10]))
            .await
            .unwrap();
        assert_eq!(audio, vec![5; 10]);
        assert_eq!(cache.stats().entry_count, 0);
        assert_eq!(cache.stats().current_size_bytes, 0);

        // 没有记录条目，下一次仍会合成
        cache
            .get_or_synthesize(&k, counting(&calls, vec![5; 10]))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lru_evicts_least_recently_used_first() {
        let (cache, clock) = memory_cache(30).await;
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_synthesize(&key("A"), counting(&calls, vec![0; 10]))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        cache
            .get_or_synthesize(&key("B"), counting(&calls, vec![0; 10]))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        // 访问 A，使 B 成为最久未使用
        cache
            .get_or_synthesize(&key("A"), counting(&calls, vec![0; 10]))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        cache
            .get_or_synthesize(&key("C"), counting(&calls, vec![0; 15]))
            .await
            .unwrap();

        assert!(cache.contains(&key("A")));
        assert!(!cache.contains(&key("B")));
        assert!(cache.contains(&key("C")));
        let stats = cache.stats();
        assert_eq!(stats.current_size_bytes, 25);
        assert!(stats.current_size_bytes <= stats.max_size_bytes);
    }

    #[tokio::test]
    async fn test_oversized_entry_is_retained_alone() {
        let (cache, clock) = memory_cache(10).await;
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_synthesize(&key("小"), counting(&calls, vec![0; 5]))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        cache
            .get_or_synthesize(&key("大"), counting(&calls, vec![0; 50]))
            .await
            .unwrap();

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 1);
        assert!(cache.contains(&key("大")));
        assert_eq!(stats.current_size_bytes, 50);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_miss() {
        let (cache, clock) = memory_cache(1024).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key("过期");

        cache
            .get_or_synthesize(&k, counting(&calls, vec![1]))
            .await
            .unwrap();
        clock.advance(Duration::hours(2));
        assert!(!cache.contains(&k));

        cache
            .get_or_synthesize(&k, counting(&calls, vec![2]))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.stats().entry_count, 1);
    }

    #[tokio::test]
    async fn test_clear_expired_removes_only_expired() {
        let (cache, clock) = memory_cache(1024).await;
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_synthesize(&key("旧"), counting(&calls, vec![1; 4]))
            .await
            .unwrap();
        cache
            .get_or_synthesize_with_ttl(&key("长"), Duration::days(1), counting(&calls, vec![1; 6]))
            .await
            .unwrap();

        clock.advance(Duration::hours(2));
        assert_eq!(cache.clear_expired().await, 1);
        assert_eq!(cache.clear_expired().await, 0);

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.current_size_bytes, 6);
        assert!(cache.contains(&key("长")));
    }

    #[tokio::test]
    async fn test_clear_keeps_counters() {
        let (cache, _) = memory_cache(1024).await;
        let calls = Arc::new(AtomicUsize::new(0));
        for text in ["甲", "乙", "甲"] {
            cache
                .get_or_synthesize(&key(text), counting(&calls, vec![1; 8]))
                .await
                .unwrap();
        }

        assert_eq!(cache.clear().await, 2);
        let stats = cache.stats();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.current_size_bytes, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn test_preload_warms_distinct_keys() {
        let (cache, _) = memory_cache(1024 * 1024).await;
        let gateway = Arc::new(FakeSynthesisGateway::new());

        let report = cache
            .preload(
                gateway.clone(),
                vec![
                    SynthesisRequest::new("你好", "zh-CN-XiaoxiaoNeural"),
                    SynthesisRequest::new("世界", "zh-CN-XiaoxiaoNeural"),
                ],
                None,
            )
            .await;

        assert_eq!(report.warmed, 2);
        assert_eq!(report.failed, 0);
        let stats = cache.stats();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_synthesize_rejects_invalid_request() {
        let (cache, _) = memory_cache(1024).await;
        let gateway = Arc::new(FakeSynthesisGateway::new());

        let err = cache
            .synthesize(gateway.clone(), SynthesisRequest::new("  ", "zh-CN-XiaoxiaoNeural"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidArgument(_)));
        assert_eq!(gateway.call_count(), 0);
        assert_eq!(cache.stats().total_requests, 0);
    }

    #[tokio::test]
    async fn test_entries_carry_request_summary() {
        let (cache, clock) = memory_cache(1024 * 1024).await;
        let gateway = Arc::new(FakeSynthesisGateway::new());

        cache
            .synthesize(gateway.clone(), SynthesisRequest::new("你好", "zh-CN-XiaoxiaoNeural"))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        cache
            .synthesize(
                gateway.clone(),
                SynthesisRequest::new("世界", "zh-CN-YunxiNeural").with_rate("+20%"),
            )
            .await
            .unwrap();

        let entries = cache.entries();
        assert_eq!(entries.len(), 2);
        let newest = entries[0].request.as_ref().unwrap();
        assert_eq!(newest.voice, "zh-CN-YunxiNeural");
        assert_eq!(newest.rate, "+20%");
        assert_eq!(newest.text_length, 2);
        assert!(!entries[0].is_expired);
    }

    #[tokio::test]
    async fn test_open_rebuilds_index_from_store() {
        let store = InMemoryAudioStore::new().arc();
        let clock = ManualClock::starting_now();
        {
            let cache = cache_with(store.clone(), 1024, clock.clone()).await;
            let calls = Arc::new(AtomicUsize::new(0));
            cache
                .get_or_synthesize(&key("持久"), counting(&calls, vec![3; 12]))
                .await
                .unwrap();
        }

        let reopened = cache_with(store, 1024, clock).await;
        let stats = reopened.stats();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.current_size_bytes, 12);
        assert_eq!(stats.total_requests, 0);
        assert!(reopened.contains(&key("持久")));
    }

    #[tokio::test]
    async fn test_abandoned_request_still_populates_cache() {
        let (cache, _) = memory_cache(1024).await;
        let cache = Arc::new(cache);
        let k = key("放弃");

        let caller = {
            let cache = cache.clone();
            let k = k.clone();
            tokio::spawn(async move {
                cache
                    .get_or_synthesize(&k, || async {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Ok::<_, SynthesisError>(vec![8u8; 4])
                    })
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        caller.abort();
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;

        assert!(cache.contains(&k));
    }
}
