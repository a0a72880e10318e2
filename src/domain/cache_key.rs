//! 缓存 Key 派生
//!
//! 由 (text, voice, rate, volume, pitch) 计算稳定的 SHA-256 指纹

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 默认语速
pub const DEFAULT_RATE: &str = "+0%";
/// 默认音量
pub const DEFAULT_VOLUME: &str = "+0%";
/// 默认音调
pub const DEFAULT_PITCH: &str = "+0Hz";

/// 缓存 Key（64 位十六进制 SHA-256）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 日志用的短前缀
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(16)]
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// 派生缓存 key
///
/// 所有输入先去掉首尾空白，其余内容（大小写、标点）原样参与哈希。
/// 规范化形式为按字段名排序的 JSON 对象。
pub fn derive_cache_key(
    text: &str,
    voice: &str,
    rate: &str,
    volume: &str,
    pitch: &str,
) -> CacheKey {
    // serde_json::Map 默认按 key 排序
    let canonical = serde_json::json!({
        "text": text.trim(),
        "voice": voice.trim(),
        "rate": rate.trim(),
        "volume": volume.trim(),
        "pitch": pitch.trim(),
    })
    .to_string();

    let digest = Sha256::digest(canonical.as_bytes());
    CacheKey(format!("{:x}", digest))
}

/// 语音合成请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    #[serde(default = "default_rate")]
    pub rate: String,
    #[serde(default = "default_volume")]
    pub volume: String,
    #[serde(default = "default_pitch")]
    pub pitch: String,
}

fn default_rate() -> String {
    DEFAULT_RATE.to_string()
}

fn default_volume() -> String {
    DEFAULT_VOLUME.to_string()
}

fn default_pitch() -> String {
    DEFAULT_PITCH.to_string()
}

impl SynthesisRequest {
    /// 使用默认韵律参数创建请求
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            rate: default_rate(),
            volume: default_volume(),
            pitch: default_pitch(),
        }
    }

    pub fn with_rate(mut self, rate: impl Into<String>) -> Self {
        self.rate = rate.into();
        self
    }

    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = volume.into();
        self
    }

    pub fn with_pitch(mut self, pitch: impl Into<String>) -> Self {
        self.pitch = pitch.into();
        self
    }

    pub fn cache_key(&self) -> CacheKey {
        derive_cache_key(&self.text, &self.voice, &self.rate, &self.volume, &self.pitch)
    }

    /// 校验请求参数，返回错误描述
    pub fn validate(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("text cannot be empty".to_string());
        }
        validate_voice_id(&self.voice)
    }
}

/// 校验音色标识：非空且不含空白或控制字符
pub fn validate_voice_id(voice: &str) -> Result<(), String> {
    let voice = voice.trim();
    if voice.is_empty() {
        return Err("voice cannot be empty".to_string());
    }
    if voice.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("malformed voice id: {:?}", voice));
    }
    Ok(())
}
