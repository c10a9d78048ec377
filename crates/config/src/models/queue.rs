use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::validation::{ConfigValidator, ValidationUtils};

/// Worker进程配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    /// 同时处理的请求数量上限
    pub max_concurrency: usize,
    /// 请求被拒绝多少次后进入死信列表
    pub max_attempts: u32,
    /// 语言包目录
    pub locale_path: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            max_attempts: 3,
            locale_path: "locale".to_string(),
        }
    }
}

impl ConfigValidator for WorkerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_count(self.max_concurrency, "worker.max_concurrency")?;
        ValidationUtils::validate_count(self.max_attempts as usize, "worker.max_attempts")?;
        ValidationUtils::validate_not_empty(&self.locale_path, "worker.locale_path")?;
        Ok(())
    }
}

/// 可靠队列配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// 所有键的公共前缀
    pub key_prefix: String,
    /// 单次阻塞认领的等待时间，决定关闭信号的响应延迟
    pub claim_poll_seconds: u64,
    /// 存储不可用时的固定退避时间，认领与确认/拒绝共用
    pub store_backoff_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            key_prefix: "tickets:gdpr:".to_string(),
            claim_poll_seconds: 1,
            store_backoff_seconds: 5,
        }
    }
}

impl QueueConfig {
    pub fn pending_key(&self) -> String {
        format!("{}pending", self.key_prefix)
    }

    pub fn in_flight_key(&self) -> String {
        format!("{}processing", self.key_prefix)
    }

    pub fn dead_letter_key(&self) -> String {
        format!("{}failed", self.key_prefix)
    }

    pub fn heartbeat_key(&self) -> String {
        format!("{}worker:heartbeat", self.key_prefix)
    }

    pub fn claim_poll(&self) -> Duration {
        Duration::from_secs(self.claim_poll_seconds)
    }

    pub fn store_backoff(&self) -> Duration {
        Duration::from_secs(self.store_backoff_seconds)
    }
}

impl ConfigValidator for QueueConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(
            self.claim_poll_seconds,
            "queue.claim_poll_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.store_backoff_seconds,
            "queue.store_backoff_seconds",
        )?;
        Ok(())
    }
}

/// 存活标记配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LivenessConfig {
    pub interval_seconds: u64,
    pub ttl_seconds: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            ttl_seconds: 30,
        }
    }
}

impl LivenessConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl ConfigValidator for LivenessConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(self.interval_seconds, "liveness.interval_seconds")?;
        ValidationUtils::validate_timeout_seconds(self.ttl_seconds, "liveness.ttl_seconds")?;
        if self.ttl_seconds <= self.interval_seconds {
            return Err(crate::ConfigError::Validation(
                "liveness.ttl_seconds must be greater than liveness.interval_seconds".to_string(),
            ));
        }
        Ok(())
    }
}

/// 完成通知配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationConfig {
    pub timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
        }
    }
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ConfigValidator for NotificationConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(self.timeout_seconds, "notification.timeout_seconds")
    }
}
