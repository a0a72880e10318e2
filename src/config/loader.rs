//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, MAX_TTL_SECS};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `TTSBROKER_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `TTSBROKER_CACHE__MAX_SIZE_MB=1024`
/// - `TTSBROKER_SESSION__TTL_SECS=7200`
/// - `TTSBROKER_DURABLE__ENABLED=true`
/// - `TTSBROKER_TTS__URL=http://tts-server:8000`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("cache.dir", "data/cache")?
        .set_default("cache.max_size_mb", 500)?
        .set_default("cache.default_ttl_secs", 604_800)?
        .set_default("cache.sweep_interval_secs", 3600)?
        .set_default("voices.ttl_secs", 86_400)?
        .set_default("session.ttl_secs", 3600)?
        .set_default("session.cleanup_interval_secs", 300)?
        .set_default("durable.enabled", false)?
        .set_default("durable.url", "sqlite:data/sessions.db?mode=rwc")?
        .set_default("durable.max_connections", 5)?
        .set_default("tts.url", "http://localhost:8000")?
        .set_default("tts.timeout_secs", 60)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 注意: 环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix("TTSBROKER")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.cache.max_size_mb == 0 {
        return Err(ConfigError::ValidationError(
            "Cache max size cannot be 0".to_string(),
        ));
    }

    if config.cache.default_ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Cache default TTL cannot be 0".to_string(),
        ));
    }

    if config.cache.sweep_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Cache sweep interval cannot be 0".to_string(),
        ));
    }

    if config.voices.ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Voice catalog TTL cannot be 0".to_string(),
        ));
    }

    if config.session.ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Session TTL cannot be 0".to_string(),
        ));
    }

    if config.session.cleanup_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Session cleanup interval cannot be 0".to_string(),
        ));
    }

    for (name, secs) in [
        ("Cache default TTL", config.cache.default_ttl_secs),
        ("Voice catalog TTL", config.voices.ttl_secs),
        ("Session TTL", config.session.ttl_secs),
    ] {
        if secs > MAX_TTL_SECS {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot exceed {}s",
                name, MAX_TTL_SECS
            )));
        }
    }

    if config.tts.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "TTS URL cannot be empty".to_string(),
        ));
    }

    if config.durable.enabled && config.durable.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "Durable backend URL cannot be empty when enabled".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Cache Directory: {:?}", config.cache.dir);
    tracing::info!("Cache Max Size: {} MB", config.cache.max_size_mb);
    tracing::info!("Cache Default TTL: {}s", config.cache.default_ttl_secs);
    tracing::info!("Cache Sweep Interval: {}s", config.cache.sweep_interval_secs);
    tracing::info!("Voice Catalog TTL: {}s", config.voices.ttl_secs);
    tracing::info!("Session TTL: {}s", config.session.ttl_secs);
    tracing::info!("Session Cleanup Interval: {}s", config.session.cleanup_interval_secs);
    tracing::info!("Durable Sessions Enabled: {}", config.durable.enabled);
    if config.durable.enabled {
        tracing::info!("Durable URL: {}", config.durable.url);
        tracing::info!("Durable Max Connections: {}", config.durable.max_connections);
    }
    tracing::info!("TTS URL: {}", config.tts.url);
    tracing::info!("TTS Timeout: {}s", config.tts.timeout_secs);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
