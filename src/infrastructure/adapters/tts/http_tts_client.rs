//! HTTP Synthesis Gateway - 调用外部 TTS HTTP 服务
//!
//! 外部 TTS API:
//! POST {base_url}/api/v1/synthesize
//! Request: {"text", "voice", "rate", "volume", "pitch"}  (JSON)
//! Response: 音频字节
//!
//! GET {base_url}/api/v1/voices
//! Response: 音色列表 (JSON)

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{SynthesisError, SynthesisGateway, VoiceCatalogSource};
use crate::domain::{SynthesisRequest, VoiceDescriptor};

/// 合成请求体 (JSON)
#[derive(Debug, Serialize)]
struct SynthesizeBody<'a> {
    text: &'a str,
    voice: &'a str,
    rate: &'a str,
    volume: &'a str,
    pitch: &'a str,
}

/// HTTP 网关配置
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// TTS 服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 60,
        }
    }
}

impl HttpGatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP 合成网关
///
/// 不做重试，失败原样返回给缓存层
pub struct HttpSynthesisGateway {
    client: Client,
    config: HttpGatewayConfig,
}

impl HttpSynthesisGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SynthesisError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn with_default_config() -> Result<Self, SynthesisError> {
        Self::new(HttpGatewayConfig::default())
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn synthesize_url(&self) -> String {
        format!("{}/api/v1/synthesize", self.base_url())
    }

    fn voices_url(&self) -> String {
        format!("{}/api/v1/voices", self.base_url())
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base_url())
    }
}

fn transport_error(e: reqwest::Error) -> SynthesisError {
    if e.is_timeout() {
        SynthesisError::Timeout
    } else if e.is_connect() {
        SynthesisError::NetworkError(format!("Cannot connect to TTS service: {}", e))
    } else {
        SynthesisError::NetworkError(e.to_string())
    }
}

/// 非 2xx 响应分类：400/404 且正文提到音色时视为未知音色
fn classify_failure(status: StatusCode, body: &str, voice: &str) -> SynthesisError {
    let mentions_voice = body.to_lowercase().contains("voice") || body.contains(voice);
    if matches!(status, StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND) && mentions_voice {
        SynthesisError::UnknownVoice(voice.to_string())
    } else {
        SynthesisError::SynthesisFailure(format!("HTTP {}: {}", status, body))
    }
}

#[async_trait]
impl SynthesisGateway for HttpSynthesisGateway {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError> {
        let body = SynthesizeBody {
            text: request.text.trim(),
            voice: request.voice.trim(),
            rate: &request.rate,
            volume: &request.volume,
            pitch: &request.pitch,
        };

        tracing::debug!(
            url = %self.synthesize_url(),
            text_len = body.text.chars().count(),
            voice = %body.voice,
            "Sending synthesis request"
        );

        let response = self
            .client
            .post(self.synthesize_url())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &error_text, body.voice));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::InvalidResponse(format!("Failed to read audio: {}", e)))?
            .to_vec();

        if audio.is_empty() {
            return Err(SynthesisError::InvalidResponse("empty audio body".to_string()));
        }

        tracing::info!(
            voice = %body.voice,
            audio_size = audio.len(),
            "Synthesis completed"
        );
        Ok(audio)
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl VoiceCatalogSource for HttpSynthesisGateway {
    async fn list_voices(&self) -> Result<Vec<VoiceDescriptor>, SynthesisError> {
        let response = self
            .client
            .get(self.voices_url())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SynthesisError::SynthesisFailure(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let voices: Vec<VoiceDescriptor> = response
            .json()
            .await
            .map_err(|e| SynthesisError::InvalidResponse(format!("Invalid voice list: {}", e)))?;

        tracing::debug!(count = voices.len(), "Voice list fetched");
        Ok(voices)
    }
}
