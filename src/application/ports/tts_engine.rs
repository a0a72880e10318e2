//! Synthesis Gateway Port - 语音合成抽象
//!
//! 外部 TTS 服务被视为不透明协作者：输入请求，输出音频字节或失败

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{SynthesisRequest, VoiceDescriptor};

/// TTS 错误
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    #[error("Unknown voice: {0}")]
    UnknownVoice(String),

    #[error("Synthesis failed: {0}")]
    SynthesisFailure(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Synthesis Gateway Port
///
/// 缓存层不做重试，重试策略属于网关或其调用方
#[async_trait]
pub trait SynthesisGateway: Send + Sync {
    /// 合成音频
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError>;

    /// 检查服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}

/// 音色目录来源
#[async_trait]
pub trait VoiceCatalogSource: Send + Sync {
    /// 拉取完整音色列表
    async fn list_voices(&self) -> Result<Vec<VoiceDescriptor>, SynthesisError>;
}
