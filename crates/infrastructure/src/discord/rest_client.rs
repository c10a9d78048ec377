use async_trait::async_trait;
use erasure_config::DiscordConfig;
use erasure_core::{
    traits::{GuildDirectory, InteractionClient},
    ErasureError, ErasureResult,
};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: u64,
}

#[derive(Debug, Deserialize)]
struct GuildPayload {
    owner_id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelPayload {
    id: String,
}

/// Discord REST客户端
///
/// 交互回调使用交互令牌鉴权，不需要Bot令牌；
/// 服务器查询和私信需要配置Bot令牌。
pub struct DiscordRestClient {
    api_base: String,
    bot_token: Option<String>,
    http_client: reqwest::Client,
}

impl DiscordRestClient {
    pub fn new(config: &DiscordConfig) -> ErasureResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ErasureError::Configuration(format!("Discord client error: {e}")))?;

        Ok(Self {
            api_base: config.api_base(),
            bot_token: config.bot_token().map(str::to_string),
            http_client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.api_base, path))
    }

    fn authorized(&self, method: Method, path: &str) -> ErasureResult<RequestBuilder> {
        let token = self
            .bot_token
            .as_deref()
            .ok_or_else(|| ErasureError::Configuration("discord token not configured".to_string()))?;
        Ok(self
            .request(method, path)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {token}")))
    }

    async fn execute(&self, builder: RequestBuilder) -> ErasureResult<reqwest::Response> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ErasureError::Discord("request timed out".to_string())
            } else {
                ErasureError::Discord(format!("connection error: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiError>(&body) {
            Ok(err) if !err.message.is_empty() => format!("{} (code {})", err.message, err.code),
            _ => format!("HTTP {status} - {body}"),
        };
        Err(ErasureError::Discord(message))
    }

    fn parse_snowflake(value: &str) -> ErasureResult<u64> {
        value
            .parse::<u64>()
            .map_err(|_| ErasureError::Discord(format!("invalid snowflake: {value}")))
    }
}

#[async_trait]
impl GuildDirectory for DiscordRestClient {
    fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }

    async fn guild_owner(&self, guild_id: u64) -> ErasureResult<u64> {
        let builder = self.authorized(Method::GET, &format!("/guilds/{guild_id}"))?;
        let guild: GuildPayload = self
            .execute(builder)
            .await?
            .json()
            .await
            .map_err(|e| ErasureError::Discord(format!("invalid guild payload: {e}")))?;
        Self::parse_snowflake(&guild.owner_id)
    }
}

#[async_trait]
impl InteractionClient for DiscordRestClient {
    async fn edit_original_response(
        &self,
        application_id: u64,
        token: &str,
        body: &Value,
    ) -> ErasureResult<()> {
        let path = format!("/webhooks/{application_id}/{token}/messages/@original");
        self.execute(self.request(Method::PATCH, &path).json(body))
            .await?;
        debug!(application_id = application_id, "Edited original interaction response");
        Ok(())
    }

    async fn create_followup(
        &self,
        application_id: u64,
        token: &str,
        body: &Value,
    ) -> ErasureResult<()> {
        let path = format!("/webhooks/{application_id}/{token}");
        self.execute(self.request(Method::POST, &path).json(body))
            .await?;
        Ok(())
    }

    async fn send_direct_message(&self, user_id: u64, body: &Value) -> ErasureResult<()> {
        let builder = self
            .authorized(Method::POST, "/users/@me/channels")?
            .json(&json!({ "recipient_id": user_id.to_string() }));
        let channel: ChannelPayload = self
            .execute(builder)
            .await?
            .json()
            .await
            .map_err(|e| ErasureError::Discord(format!("invalid channel payload: {e}")))?;

        let builder = self
            .authorized(Method::POST, &format!("/channels/{}/messages", channel.id))?
            .json(body);
        self.execute(builder).await?;
        Ok(())
    }
}
