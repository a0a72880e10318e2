//! 音色描述

use serde::{Deserialize, Serialize};

/// 合成服务提供的音色描述
///
/// 字段名沿用上游目录格式（`ShortName`、`Locale` 等），未知字段原样保留
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceDescriptor {
    #[serde(default)]
    pub name: String,
    pub short_name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub locale: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl VoiceDescriptor {
    pub fn new(short_name: impl Into<String>, locale: impl Into<String>) -> Self {
        let short_name = short_name.into();
        Self {
            name: short_name.clone(),
            short_name,
            gender: String::new(),
            locale: locale.into(),
            extra: serde_json::Map::new(),
        }
    }
}
