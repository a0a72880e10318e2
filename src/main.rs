//! ttsbroker - TTS 请求代理
//!
//! 进程启动时构造一次所有服务：
//! - AudioCacheStore: Sled 持久化的合成音频缓存
//! - VoiceCatalogCache: 音色目录缓存
//! - SessionStore: 临时（内存）+ 持久（SQLite）会话
//! - 两个后台清扫任务，ctrl-c 时取消并等待退出

use std::sync::Arc;

use ttsbroker::application::ports::{SessionBackend, SynthesisGateway, SystemClock};
use ttsbroker::application::services::{
    AudioCacheConfig, AudioCacheStore, SessionStore, VoiceCatalogCache,
};
use ttsbroker::config::{load_config, print_config, AppConfig};
use ttsbroker::infrastructure::adapters::{
    HttpGatewayConfig, HttpSynthesisGateway, PunctuationSegmenter,
};
use ttsbroker::infrastructure::memory::InMemorySessionBackend;
use ttsbroker::infrastructure::persistence::sled::{SledAudioStore, SledStoreConfig};
use ttsbroker::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteSessionBackend,
};
use ttsbroker::infrastructure::worker::PeriodicSweeper;

fn init_tracing(config: &AppConfig) {
    let log_filter = format!("{},ttsbroker={}", config.log.level, config.log.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// 连接持久会话后端；失败时返回 None，持久会话降级为临时会话
async fn connect_durable(config: &AppConfig) -> Option<Arc<dyn SessionBackend>> {
    if !config.durable.enabled {
        tracing::info!("Durable session backend disabled");
        return None;
    }

    let db_config = DatabaseConfig {
        database_url: config.durable.url.clone(),
        max_connections: config.durable.max_connections,
    };
    let pool = match create_pool(&db_config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "Durable backend unavailable, persistent sessions will be downgraded");
            return None;
        }
    };
    if let Err(e) = run_migrations(&pool).await {
        tracing::warn!(error = %e, "Durable backend migration failed, persistent sessions will be downgraded");
        return None;
    }

    Some(SqliteSessionBackend::new(pool).arc())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);

    tracing::info!("ttsbroker - TTS request broker");
    print_config(&config);

    // 确保数据目录存在
    if let Some(parent) = config.cache.dir.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let clock = SystemClock::arc();

    // 音频缓存
    let store = SledAudioStore::new(&SledStoreConfig {
        db_path: config.cache.dir.to_string_lossy().to_string(),
    })?
    .arc();
    let cache = AudioCacheStore::open(
        store,
        AudioCacheConfig {
            max_size_bytes: config.cache.max_size_bytes(),
            default_ttl: config.cache.default_ttl(),
        },
        clock.clone(),
    )
    .await?
    .arc();

    // 合成网关与音色目录
    let gateway = HttpSynthesisGateway::new(
        HttpGatewayConfig::new(config.tts.url.clone()).with_timeout(config.tts.timeout_secs),
    )?
    .arc();
    if !gateway.health_check().await {
        tracing::warn!(url = %config.tts.url, "TTS service health check failed");
    }
    let voices = VoiceCatalogCache::new(gateway.clone(), config.voices.ttl(), clock.clone()).arc();
    match voices.get_voices().await {
        Ok(list) => tracing::info!(count = list.len(), "Voice catalog warmed"),
        Err(e) => tracing::warn!(error = %e, "Voice catalog unavailable at startup"),
    }

    // 会话
    let durable = connect_durable(&config).await;
    let sessions = SessionStore::new(
        InMemorySessionBackend::new().arc(),
        durable,
        PunctuationSegmenter::new().arc(),
        clock.clone(),
        config.session.ttl(),
    )
    .arc();

    // 后台清扫
    let session_sweeper =
        PeriodicSweeper::new(sessions.clone(), config.session.cleanup_interval()).spawn();
    let cache_sweeper = PeriodicSweeper::new(cache.clone(), config.cache.sweep_interval()).spawn();

    let stats = cache.stats();
    tracing::info!(
        entries = stats.entry_count,
        current_size = stats.current_size_bytes,
        durable_available = sessions.durable_available(),
        "ttsbroker ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    session_sweeper.shutdown().await;
    cache_sweeper.shutdown().await;
    if let Err(e) = cache.flush().await {
        tracing::error!(error = %e, "Failed to flush audio cache");
    }

    tracing::info!("ttsbroker stopped");
    Ok(())
}
