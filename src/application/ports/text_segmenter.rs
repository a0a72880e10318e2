//! Segmenter Port - 文本分词抽象
//!
//! 分词算法是外部黑盒：text -> 有序的 {sentence, words[]} 列表

use thiserror::Error;

use crate::domain::SentenceSegment;

/// 分词错误
#[derive(Debug, Clone, Error)]
pub enum SegmentationError {
    #[error("Segmentation failed: {0}")]
    Failed(String),

    #[error("Segmenter unavailable: {0}")]
    Unavailable(String),
}

/// Segmenter Port
pub trait Segmenter: Send + Sync {
    /// 将文本切分为句子，再将句子切分为词
    fn segment(&self, text: &str) -> Result<Vec<SentenceSegment>, SegmentationError>;
}
