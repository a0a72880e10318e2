//! Voice Catalog Cache - 音色目录缓存
//!
//! 整个目录作为单一条目缓存，过期或强制刷新时重新拉取；
//! 并发刷新合并为一次上游请求，拉取失败时优先返回旧数据。

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::single_flight::SingleFlight;
use crate::application::error::BrokerError;
use crate::application::ports::{Clock, VoiceCatalogSource};
use crate::domain::VoiceDescriptor;

/// 默认目录 TTL（24 小时）
pub const DEFAULT_VOICE_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
struct VoiceCatalogEntry {
    voices: Arc<Vec<VoiceDescriptor>>,
    fetched_at: DateTime<Utc>,
}

impl VoiceCatalogEntry {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        // 超出时间范围的 TTL 视为永不过期
        self.fetched_at
            .checked_add_signed(ttl)
            .map_or(true, |expires_at| now < expires_at)
    }
}

type CatalogResult = Result<Arc<Vec<VoiceDescriptor>>, BrokerError>;

pub struct VoiceCatalogCache {
    source: Arc<dyn VoiceCatalogSource>,
    entry: Arc<RwLock<Option<VoiceCatalogEntry>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    flights: SingleFlight<(), CatalogResult>,
}

impl VoiceCatalogCache {
    pub fn new(source: Arc<dyn VoiceCatalogSource>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            entry: Arc::new(RwLock::new(None)),
            ttl,
            clock,
            flights: SingleFlight::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 获取音色列表，缓存未过期时不访问上游
    pub async fn get_voices(&self) -> Result<Vec<VoiceDescriptor>, BrokerError> {
        if let Some(voices) = self.fresh().await {
            tracing::debug!(count = voices.len(), "Voice catalog cache hit");
            return Ok(voices.as_slice().to_vec());
        }
        self.refresh(false).await
    }

    /// 忽略 TTL，立即刷新
    pub async fn force_refresh(&self) -> Result<Vec<VoiceDescriptor>, BrokerError> {
        self.refresh(true).await
    }

    /// 音色是否在目录中
    pub async fn validate_voice(&self, short_name: &str) -> Result<bool, BrokerError> {
        let voices = self.get_voices().await?;
        Ok(voices.iter().any(|voice| voice.short_name == short_name))
    }

    /// 丢弃缓存条目，下次读取将重新拉取
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
        tracing::info!("Voice catalog cache invalidated");
    }

    async fn fresh(&self) -> Option<Arc<Vec<VoiceDescriptor>>> {
        let now = self.clock.now();
        let guard = self.entry.read().await;
        guard
            .as_ref()
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| Arc::clone(&entry.voices))
    }

    /// `force` 为 false 时，若上一轮刷新已写入新数据则直接返回
    async fn refresh(&self, force: bool) -> Result<Vec<VoiceDescriptor>, BrokerError> {
        let source = Arc::clone(&self.source);
        let entry = Arc::clone(&self.entry);
        let clock = Arc::clone(&self.clock);
        let ttl = self.ttl;

        let outcome = self
            .flights
            .run((), move || async move {
                if !force {
                    let now = clock.now();
                    let cached = entry
                        .read()
                        .await
                        .as_ref()
                        .filter(|cached| cached.is_fresh(now, ttl))
                        .map(|cached| Arc::clone(&cached.voices));
                    if let Some(voices) = cached {
                        return Ok(voices);
                    }
                }

                match source.list_voices().await {
                    Ok(voices) => {
                        let voices = Arc::new(voices);
                        *entry.write().await = Some(VoiceCatalogEntry {
                            voices: Arc::clone(&voices),
                            fetched_at: clock.now(),
                        });
                        tracing::info!(count = voices.len(), "Voice catalog refreshed");
                        Ok(voices)
                    }
                    Err(e) => {
                        let stale = entry
                            .read()
                            .await
                            .as_ref()
                            .map(|cached| Arc::clone(&cached.voices));
                        match stale {
                            Some(voices) => {
                                tracing::warn!(error = %e, "Voice catalog fetch failed, serving stale entry");
                                Ok(voices)
                            }
                            None => Err(BrokerError::from(e)),
                        }
                    }
                }
            })
            .await
            .map_err(|e| BrokerError::internal(e.to_string()))?;

        outcome.value.map(|voices| voices.as_slice().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{ManualClock, SynthesisError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        failing: AtomicBool,
        delay_ms: u64,
    }

    impl CountingSource {
        fn new(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                delay_ms,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VoiceCatalogSource for CountingSource {
        async fn list_voices(&self) -> Result<Vec<VoiceDescriptor>, SynthesisError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(SynthesisError::NetworkError("connection refused".to_string()));
            }
            Ok(vec![
                VoiceDescriptor::new("zh-CN-XiaoxiaoNeural", "zh-CN"),
                VoiceDescriptor::new(format!("en-US-Voice{}", n), "en-US"),
            ])
        }
    }

    fn catalog(source: Arc<CountingSource>, clock: Arc<ManualClock>) -> VoiceCatalogCache {
        VoiceCatalogCache::new(source, Duration::seconds(DEFAULT_VOICE_TTL_SECS), clock)
    }

    #[tokio::test]
    async fn test_cached_within_ttl() {
        let source = CountingSource::new(0);
        let clock = ManualClock::starting_now();
        let cache = catalog(source.clone(), clock.clone());

        let first = cache.get_voices().await.unwrap();
        clock.advance(Duration::hours(23));
        let second = cache.get_voices().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_refetch_after_ttl() {
        let source = CountingSource::new(0);
        let clock = ManualClock::starting_now();
        let cache = catalog(source.clone(), clock.clone());

        cache.get_voices().await.unwrap();
        clock.advance(Duration::hours(25));
        let voices = cache.get_voices().await.unwrap();

        assert_eq!(source.calls(), 2);
        assert_eq!(voices[1].short_name, "en-US-Voice1");
    }

    #[tokio::test]
    async fn test_refresh_rechecks_freshness_before_fetching() {
        let source = CountingSource::new(0);
        let clock = ManualClock::starting_now();
        let cache = catalog(source.clone(), clock.clone());

        cache.get_voices().await.unwrap();
        // 调用方看到旧数据后，另一轮刷新先完成
        clock.advance(Duration::hours(25));
        cache.force_refresh().await.unwrap();
        assert_eq!(source.calls(), 2);

        let voices = cache.refresh(false).await.unwrap();
        assert_eq!(voices[1].short_name, "en-US-Voice1");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let source = CountingSource::new(0);
        let clock = ManualClock::starting_now();
        let cache = VoiceCatalogCache::new(source.clone(), Duration::days(365 * 300_000), clock.clone());

        cache.get_voices().await.unwrap();
        clock.advance(Duration::days(36500));
        cache.get_voices().await.unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_ttl() {
        let source = CountingSource::new(0);
        let cache = catalog(source.clone(), ManualClock::starting_now());

        cache.get_voices().await.unwrap();
        cache.force_refresh().await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_collapses() {
        let source = CountingSource::new(100);
        let cache = Arc::new(catalog(source.clone(), ManualClock::starting_now()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get_voices().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 2);
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_served_on_failure() {
        let source = CountingSource::new(0);
        let clock = ManualClock::starting_now();
        let cache = catalog(source.clone(), clock.clone());

        let original = cache.get_voices().await.unwrap();
        source.failing.store(true, Ordering::SeqCst);
        clock.advance(Duration::hours(25));

        let voices = cache.get_voices().await.unwrap();
        assert_eq!(voices, original);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_without_entry_propagates() {
        let source = CountingSource::new(0);
        source.failing.store(true, Ordering::SeqCst);
        let cache = catalog(source, ManualClock::starting_now());

        let err = cache.get_voices().await.unwrap_err();
        assert!(matches!(err, BrokerError::UpstreamFailure(_)));
    }

    #[tokio::test]
    async fn test_validate_and_invalidate() {
        let source = CountingSource::new(0);
        let cache = catalog(source.clone(), ManualClock::starting_now());

        assert!(cache.validate_voice("zh-CN-XiaoxiaoNeural").await.unwrap());
        assert!(!cache.validate_voice("xx-XX-Nobody").await.unwrap());
        assert_eq!(source.calls(), 1);

        cache.invalidate().await;
        cache.get_voices().await.unwrap();
        assert_eq!(source.calls(), 2);
    }
}
