use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::validation::{ConfigValidator, ValidationUtils};

/// 队列存储（Redis）连接配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedisConfig {
    /// `host:port`
    pub address: String,
    pub password: Option<String>,
    pub database: i64,
    pub threads: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6379".to_string(),
            password: None,
            database: 0,
            threads: 5,
        }
    }
}

impl RedisConfig {
    /// 构建Redis连接URL
    pub fn build_connection_url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!("redis://:{}@{}/{}", password, self.address, self.database),
            None => format!("redis://{}/{}", self.address, self.database),
        }
    }
}

impl ConfigValidator for RedisConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_address(&self.address, "redis.address")?;
        ValidationUtils::validate_count(self.threads, "redis.threads")?;
        Ok(())
    }
}

/// 工单数据库配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub name: String,
    pub user: String,
    pub password: Option<String>,
    pub threads: u32,
    pub connection_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost:5432".to_string(),
            name: "tickets".to_string(),
            user: "postgres".to_string(),
            password: None,
            threads: 5,
            connection_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(
                "postgres://{}:{}@{}/{}",
                self.user, password, self.host, self.name
            ),
            None => format!("postgres://{}@{}/{}", self.user, self.host, self.name),
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.host, "database.host")?;
        ValidationUtils::validate_not_empty(&self.name, "database.name")?;
        ValidationUtils::validate_not_empty(&self.user, "database.user")?;
        ValidationUtils::validate_count(self.threads as usize, "database.threads")?;
        ValidationUtils::validate_timeout_seconds(
            self.connection_timeout_seconds,
            "database.connection_timeout_seconds",
        )?;
        Ok(())
    }
}

/// 归档服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiverConfig {
    pub url: String,
    /// 归档内容的AES密钥，按原始字节使用
    pub aes_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            aes_key: None,
            timeout_seconds: 30,
        }
    }
}

impl ArchiverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ConfigValidator for ArchiverConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_url(&self.url, "archiver.url")?;
        ValidationUtils::validate_timeout_seconds(self.timeout_seconds, "archiver.timeout_seconds")?;
        if let Some(key) = &self.aes_key {
            if ![16, 24, 32].contains(&key.len()) {
                return Err(crate::ConfigError::Validation(
                    "archiver.aes_key must be 16, 24 or 32 bytes".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Discord REST配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscordConfig {
    /// REST代理地址，为空时直连官方接口
    pub proxy_url: Option<String>,
    pub token: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            token: None,
            timeout_seconds: 15,
        }
    }
}

impl DiscordConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://discord.com/api/v10";

    pub fn api_base(&self) -> String {
        match self.proxy_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => Self::DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn bot_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ConfigValidator for DiscordConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if let Some(url) = self.proxy_url.as_deref().filter(|u| !u.trim().is_empty()) {
            ValidationUtils::validate_url(url, "discord.proxy_url")?;
        }
        ValidationUtils::validate_timeout_seconds(self.timeout_seconds, "discord.timeout_seconds")?;
        Ok(())
    }
}
