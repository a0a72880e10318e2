//! Fake Synthesis Gateway - 用于开发和测试的网关
//!
//! 不调用任何服务，根据请求内容生成确定性的字节

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{SynthesisError, SynthesisGateway, VoiceCatalogSource};
use crate::domain::{SynthesisRequest, VoiceDescriptor};

/// Fake 网关配置
#[derive(Debug, Clone, Default)]
pub struct FakeGatewayConfig {
    /// 模拟合成延迟
    pub latency: Duration,
    /// 已知音色；为空表示接受任意音色
    pub known_voices: Vec<String>,
}

/// Fake Synthesis Gateway
pub struct FakeSynthesisGateway {
    config: FakeGatewayConfig,
    known: HashSet<String>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeSynthesisGateway {
    pub fn new() -> Self {
        Self::with_config(FakeGatewayConfig::default())
    }

    pub fn with_config(config: FakeGatewayConfig) -> Self {
        let known = config.known_voices.iter().cloned().collect();
        Self {
            config,
            known,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 已执行的合成次数（包括失败）
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 打开后所有合成请求都失败
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 同一请求总是得到相同的字节
    pub fn render(request: &SynthesisRequest) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(request.cache_key().as_str().as_bytes());
        let digest = hasher.finalize();

        let mut audio = b"FAKE".to_vec();
        audio.extend_from_slice(&digest);
        audio.extend_from_slice(request.text.trim().as_bytes());
        audio
    }
}

impl Default for FakeSynthesisGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisGateway for FakeSynthesisGateway {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            text_len = request.text.chars().count(),
            voice = %request.voice,
            "FakeSynthesisGateway: rendering deterministic audio"
        );

        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SynthesisError::SynthesisFailure(
                "fake gateway failure switch is on".to_string(),
            ));
        }
        if !self.known.is_empty() && !self.known.contains(request.voice.trim()) {
            return Err(SynthesisError::UnknownVoice(request.voice.clone()));
        }

        Ok(Self::render(request))
    }
}

#[async_trait]
impl VoiceCatalogSource for FakeSynthesisGateway {
    async fn list_voices(&self) -> Result<Vec<VoiceDescriptor>, SynthesisError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SynthesisError::NetworkError(
                "fake gateway failure switch is on".to_string(),
            ));
        }
        Ok(self
            .config
            .known_voices
            .iter()
            .map(|name| {
                let locale = name.splitn(3, '-').take(2).collect::<Vec<_>>().join("-");
                VoiceDescriptor::new(name.clone(), locale)
            })
            .collect())
    }
}
