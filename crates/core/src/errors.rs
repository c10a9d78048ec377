use thiserror::Error;

/// 擦除服务错误类型定义
#[derive(Debug, Error)]
pub enum ErasureError {
    #[error("队列存储不可用: {0}")]
    StoreUnavailable(String),

    #[error("无法解析的队列条目: {0}")]
    MalformedItem(String),

    #[error("请求处理失败: {0}")]
    HandlerFailure(String),

    #[error("完成通知发送失败: {0}")]
    NotificationFailure(String),

    #[error("队列条目未找到: {request_id}")]
    NotFound { request_id: String },

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("归档服务错误: {0}")]
    Archive(String),

    #[error("Discord接口错误: {0}")]
    Discord(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ErasureError {
    /// 队列存储层面的错误，可以通过退避重试恢复
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, ErasureError::StoreUnavailable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ErasureError::NotFound { .. })
    }

    pub fn not_found(request_id: impl Into<String>) -> Self {
        ErasureError::NotFound {
            request_id: request_id.into(),
        }
    }

    /// 不带分类前缀的错误描述，展示给请求方时使用
    pub fn detail(&self) -> String {
        match self {
            ErasureError::StoreUnavailable(msg)
            | ErasureError::MalformedItem(msg)
            | ErasureError::HandlerFailure(msg)
            | ErasureError::NotificationFailure(msg)
            | ErasureError::Archive(msg)
            | ErasureError::Discord(msg)
            | ErasureError::Serialization(msg)
            | ErasureError::Configuration(msg)
            | ErasureError::Internal(msg) => msg.clone(),
            ErasureError::NotFound { request_id } => format!("{request_id} not found"),
            ErasureError::Database(e) => e.to_string(),
        }
    }
}

impl From<redis::RedisError> for ErasureError {
    fn from(err: redis::RedisError) -> Self {
        ErasureError::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for ErasureError {
    fn from(err: serde_json::Error) -> Self {
        ErasureError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type ErasureResult<T> = std::result::Result<T, ErasureError>;
