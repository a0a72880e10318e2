//! 默认分词器
//!
//! 分段策略：
//! 1. 按行分割（支持 \n 和 \r\n）
//! 2. 每行按句末标点分割，标点保留在句尾
//! 3. 只有引号的片段合并到前一句
//! 4. 中日文字每个字符为一个词，其余按空白和标点切分

use std::sync::Arc;

use crate::application::ports::{SegmentationError, Segmenter};
use crate::domain::SentenceSegment;

/// 句末标点（总是分割）
#[inline]
fn is_sentence_end(ch: char) -> bool {
    matches!(ch, '。' | '？' | '！' | '?' | '!')
}

#[inline]
fn is_closing_quote(ch: char) -> bool {
    matches!(ch, '\u{201D}' | '\u{2019}' | '」' | '』' | '"' | '\'')
}

/// 片段是否只包含引号或空白
#[inline]
fn is_trivial_segment(s: &str) -> bool {
    s.chars().all(|c| {
        matches!(
            c,
            '"' | '\u{201C}' | '\u{201D}' | '\'' | '\u{2018}' | '\u{2019}' | '」' | '』' | ' ' | '\t'
        )
    })
}

/// 中日文字（汉字、假名）
#[inline]
fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{20000}'..='\u{2A6DF}')
}

/// 按句末标点分割单行
fn split_line(line: &str) -> Vec<String> {
    let mut sentences: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if is_sentence_end(ch) {
            // 连续的句末标点与收尾引号留在本句
            while let Some(&next) = chars.peek() {
                if is_sentence_end(next) || is_closing_quote(next) {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            push_sentence(&mut sentences, &current);
            current.clear();
        }
    }
    push_sentence(&mut sentences, &current);

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    if is_trivial_segment(trimmed) {
        // 收尾引号归入前一句
        if let Some(last) = sentences.last_mut() {
            last.push_str(trimmed);
        }
        return;
    }
    sentences.push(trimmed.to_string());
}

/// 切分句子为词
fn split_words(sentence: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut token = String::new();

    for ch in sentence.chars() {
        if is_cjk(ch) {
            if !token.is_empty() {
                words.push(std::mem::take(&mut token));
            }
            words.push(ch.to_string());
        } else if ch.is_alphanumeric() || ch == '\'' || ch == '-' {
            token.push(ch);
        } else if !token.is_empty() {
            words.push(std::mem::take(&mut token));
        }
    }
    if !token.is_empty() {
        words.push(token);
    }

    words
}

/// 对文本进行分段与分词
pub fn segment_text(text: &str) -> Vec<SentenceSegment> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .flat_map(split_line)
        .filter_map(|sentence| {
            let words = split_words(&sentence);
            if words.is_empty() {
                None
            } else {
                Some(SentenceSegment { sentence, words })
            }
        })
        .collect()
}

/// 基于标点的分词器
#[derive(Debug, Clone, Copy, Default)]
pub struct PunctuationSegmenter;

impl PunctuationSegmenter {
    pub fn new() -> Self {
        Self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Segmenter for PunctuationSegmenter {
    fn segment(&self, text: &str) -> Result<Vec<SentenceSegment>, SegmentationError> {
        let segments = segment_text(text);
        tracing::debug!(
            char_count = text.chars().count(),
            sentences = segments.len(),
            "Text segmented"
        );
        Ok(segments)
    }
}
