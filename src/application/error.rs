//! 应用层错误定义
//!
//! 统一的缓存/会话错误分类

use thiserror::Error;

use crate::application::ports::{
    CacheError, SegmentationError, SessionBackendError, SynthesisError,
};

/// 应用层错误
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// 资源未找到（会话或缓存 key）
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 参数无效（空文本、非法音色等），不会触达存储
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 上游失败（合成或分词），不写入任何条目
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// 持久后端不可用
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// 创建参数错误
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<SynthesisError> for BrokerError {
    fn from(err: SynthesisError) -> Self {
        Self::UpstreamFailure(err.to_string())
    }
}

impl From<SegmentationError> for BrokerError {
    fn from(err: SegmentationError) -> Self {
        Self::UpstreamFailure(err.to_string())
    }
}

impl From<SessionBackendError> for BrokerError {
    fn from(err: SessionBackendError) -> Self {
        Self::BackendUnavailable(err.to_string())
    }
}

impl From<CacheError> for BrokerError {
    fn from(err: CacheError) -> Self {
        Self::BackendUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesis_errors_map_to_taxonomy() {
        let unknown: BrokerError = SynthesisError::UnknownVoice("xx".to_string()).into();
        assert!(matches!(unknown, BrokerError::UpstreamFailure(ref m) if m.contains("xx")));

        let failed: BrokerError = SynthesisError::Timeout.into();
        assert!(matches!(failed, BrokerError::UpstreamFailure(_)));
    }

    #[test]
    fn test_not_found_message() {
        let err = BrokerError::not_found("Session", "abc");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Session not found: abc");
    }
}
