use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    logging::LogConfig,
    queue::{LivenessConfig, NotificationConfig, QueueConfig, WorkerConfig},
    services::{ArchiverConfig, DatabaseConfig, DiscordConfig, RedisConfig},
};
use crate::validation::ConfigValidator;

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "ERASURE_CONFIG";

/// 部署环境中沿用的扁平环境变量名及其对应的配置键
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("MAX_CONCURRENCY", "worker.max_concurrency"),
    ("MAX_RETRIES", "worker.max_attempts"),
    ("LOCALE_PATH", "worker.locale_path"),
    ("JSON_LOGS", "logging.json"),
    ("LOG_LEVEL", "logging.level"),
    ("REDIS_ADDR", "redis.address"),
    ("REDIS_PASSWD", "redis.password"),
    ("REDIS_THREADS", "redis.threads"),
    ("DATABASE_HOST", "database.host"),
    ("DATABASE_NAME", "database.name"),
    ("DATABASE_USER", "database.user"),
    ("DATABASE_PASSWORD", "database.password"),
    ("DATABASE_THREADS", "database.threads"),
    ("ARCHIVER_URL", "archiver.url"),
    ("ARCHIVER_AES_KEY", "archiver.aes_key"),
    ("DISCORD_PROXY_URL", "discord.proxy_url"),
    ("DISCORD_TOKEN", "discord.token"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    pub worker: WorkerConfig,
    pub queue: QueueConfig,
    pub liveness: LivenessConfig,
    pub notification: NotificationConfig,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub archiver: ArchiverConfig,
    pub discord: DiscordConfig,
    pub logging: LogConfig,
}

impl AppConfig {
    /// 从进程环境加载配置
    pub fn load() -> Result<Self> {
        let env: Map<String, String> = std::env::vars().collect();
        Self::load_from(&env)
    }

    /// 按 默认值 → 配置文件 → `ERASURE_` 前缀变量 → 扁平变量 的顺序合并配置
    pub fn load_from(env: &Map<String, String>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder().add_source(
            ConfigBuilder::try_from(&AppConfig::default()).context("生成默认配置失败")?,
        );

        if let Some(path) = env.get(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("ERASURE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        for (name, key) in LEGACY_ENV_KEYS {
            let value = match env.get(*name).map(|v| v.trim()) {
                Some(v) if !v.is_empty() => v,
                _ => continue,
            };
            let value = if *name == "LOG_LEVEL" {
                value.to_lowercase()
            } else {
                value.to_string()
            };
            builder = builder
                .set_override(*key, value)
                .with_context(|| format!("无法应用环境变量 {name}"))?;
        }

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.worker.validate()?;
        self.queue.validate()?;
        self.liveness.validate()?;
        self.notification.validate()?;
        self.redis.validate()?;
        self.database.validate()?;
        self.archiver.validate()?;
        self.discord.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
