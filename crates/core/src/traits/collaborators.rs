use async_trait::async_trait;
use serde_json::Value;

use crate::ErasureResult;

/// 工单定位信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketRef {
    pub guild_id: u64,
    pub ticket_id: i64,
}

impl TicketRef {
    pub fn new(guild_id: u64, ticket_id: i64) -> Self {
        Self {
            guild_id,
            ticket_id,
        }
    }
}

/// 工单数据库访问
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// 服务器内已关闭且存在归档的工单ID，`filter` 非空时只在其中筛选
    async fn archived_ticket_ids(
        &self,
        guild_id: u64,
        filter: Option<&[i64]>,
    ) -> ErasureResult<Vec<i64>>;

    /// 用户作为创建者或成员参与过的已归档工单
    async fn tickets_for_user(&self, user_id: u64) -> ErasureResult<Vec<TicketRef>>;

    /// 工单是否存在归档，工单不存在时返回 `None`
    async fn has_transcript(&self, ticket: TicketRef) -> ErasureResult<Option<bool>>;

    async fn set_has_transcript(&self, ticket: TicketRef, value: bool) -> ErasureResult<()>;
}

/// 归档存储
#[async_trait]
pub trait TranscriptArchive: Send + Sync {
    async fn delete_transcript(&self, ticket: TicketRef) -> ErasureResult<()>;

    async fn fetch_transcript(&self, ticket: TicketRef) -> ErasureResult<Value>;

    async fn store_transcript(&self, ticket: TicketRef, transcript: &Value) -> ErasureResult<()>;
}

/// 服务器信息查询
#[async_trait]
pub trait GuildDirectory: Send + Sync {
    /// 未配置凭据时返回 `false`，调用方据此跳过所有权校验
    fn is_configured(&self) -> bool;

    async fn guild_owner(&self, guild_id: u64) -> ErasureResult<u64>;
}

/// 交互回调与私信发送
#[async_trait]
pub trait InteractionClient: Send + Sync {
    async fn edit_original_response(
        &self,
        application_id: u64,
        token: &str,
        body: &Value,
    ) -> ErasureResult<()>;

    async fn create_followup(&self, application_id: u64, token: &str, body: &Value)
        -> ErasureResult<()>;

    async fn send_direct_message(&self, user_id: u64, body: &Value) -> ErasureResult<()>;
}
