//! Configuration Types
//!
//! 定义所有配置结构体

use chrono::Duration;
use serde::Deserialize;
use std::path::PathBuf;

/// TTL 类配置的上限（100 年）
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 3600;

fn ttl_from_secs(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 音频缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 音色目录配置
    #[serde(default)]
    pub voices: VoicesConfig,

    /// 会话配置
    #[serde(default)]
    pub session: SessionConfig,

    /// 持久会话后端配置
    #[serde(default)]
    pub durable: DurableConfig,

    /// TTS 服务配置
    #[serde(default)]
    pub tts: TtsConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 音频缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Sled 数据目录
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// 最大缓存大小（MB）
    #[serde(default = "default_cache_max_size_mb")]
    pub max_size_mb: u64,

    /// 默认过期时间（秒）
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,

    /// 过期清扫间隔（秒）
    #[serde(default = "default_cache_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

fn default_cache_max_size_mb() -> u64 {
    500
}

fn default_cache_ttl() -> u64 {
    7 * 24 * 3600 // 7 天
}

fn default_cache_sweep_interval() -> u64 {
    3600 // 1 小时
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_size_mb: default_cache_max_size_mb(),
            default_ttl_secs: default_cache_ttl(),
            sweep_interval_secs: default_cache_sweep_interval(),
        }
    }
}

impl CacheConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn default_ttl(&self) -> Duration {
        ttl_from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

/// 音色目录配置
#[derive(Debug, Clone, Deserialize)]
pub struct VoicesConfig {
    /// 目录缓存时间（秒）
    #[serde(default = "default_voices_ttl")]
    pub ttl_secs: u64,
}

fn default_voices_ttl() -> u64 {
    86400 // 24 小时
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_voices_ttl(),
        }
    }
}

impl VoicesConfig {
    pub fn ttl(&self) -> Duration {
        ttl_from_secs(self.ttl_secs)
    }
}

/// 会话配置
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 临时会话默认 TTL（秒）
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// 过期会话清理间隔（秒）
    #[serde(default = "default_session_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_session_ttl() -> u64 {
    3600 // 1 小时
}

fn default_session_cleanup_interval() -> u64 {
    300 // 5 分钟
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            cleanup_interval_secs: default_session_cleanup_interval(),
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        ttl_from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// 持久会话后端配置
#[derive(Debug, Clone, Deserialize)]
pub struct DurableConfig {
    /// 是否启用持久后端
    #[serde(default)]
    pub enabled: bool,

    /// 数据库连接串
    #[serde(default = "default_durable_url")]
    pub url: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_durable_url() -> String {
    "sqlite:data/sessions.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_durable_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// TTS 服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    /// TTS 服务基础 URL
    #[serde(default = "default_tts_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,
}

fn default_tts_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_tts_timeout() -> u64 {
    60
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            url: default_tts_url(),
            timeout_secs: default_tts_timeout(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.cache.dir, PathBuf::from("data/cache"));
        assert_eq!(config.cache.max_size_bytes(), 500 * 1024 * 1024);
        assert_eq!(config.cache.default_ttl(), Duration::days(7));
        assert_eq!(config.voices.ttl(), Duration::hours(24));
        assert_eq!(config.session.ttl(), Duration::hours(1));
        assert_eq!(config.session.cleanup_interval_secs, 300);
        assert!(!config.durable.enabled);
        assert_eq!(config.tts.url, "http://localhost:8000");
    }

    #[test]
    fn test_ttl_conversion_is_clamped() {
        let config = SessionConfig {
            ttl_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.ttl(), Duration::seconds(MAX_TTL_SECS as i64));

        let cache = CacheConfig {
            max_size_mb: u64::MAX,
            ..Default::default()
        };
        assert_eq!(cache.max_size_bytes(), u64::MAX);
    }

    #[test]
    fn test_durable_url_default() {
        let config = DurableConfig::default();
        assert_eq!(config.url, "sqlite:data/sessions.db?mode=rwc");
        assert_eq!(config.max_connections, 5);
    }
}
