use async_trait::async_trait;
use erasure_config::ArchiverConfig;
use erasure_core::{
    traits::{TicketRef, TranscriptArchive},
    ErasureError, ErasureResult,
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, error};

use super::codec::TranscriptCodec;

/// 归档服务HTTP客户端
///
/// 通过归档代理读取、重新导入或删除工单归档，读写的内容经过 [`TranscriptCodec`] 编解码。
pub struct HttpTranscriptArchive {
    base_url: String,
    http_client: reqwest::Client,
    codec: TranscriptCodec,
}

impl HttpTranscriptArchive {
    pub fn new(config: &ArchiverConfig) -> ErasureResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ErasureError::Configuration(format!("Archive client error: {e}")))?;
        let key = config.aes_key.as_deref().ok_or_else(|| {
            ErasureError::Configuration("archiver.aes_key is required".to_string())
        })?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http_client,
            codec: TranscriptCodec::new(key.as_bytes())?,
        })
    }

    fn request(&self, method: Method, path: &str, ticket: TicketRef) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.base_url, path))
            .query(&[
                ("guild", ticket.guild_id.to_string()),
                ("id", ticket.ticket_id.to_string()),
            ])
    }

    async fn send(&self, builder: RequestBuilder, ticket: TicketRef) -> ErasureResult<reqwest::Response> {
        let response = builder.send().await.map_err(|e| {
            error!(guild_id = ticket.guild_id, ticket_id = ticket.ticket_id, "Archive request failed: {}", e);
            ErasureError::Archive(format!("archive connection error: {e}"))
        })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(ErasureError::Archive("transcript not found".to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ErasureError::Archive(format!("HTTP {status} - {body}")))
            }
        }
    }
}

#[async_trait]
impl TranscriptArchive for HttpTranscriptArchive {
    async fn delete_transcript(&self, ticket: TicketRef) -> ErasureResult<()> {
        let builder = self.request(Method::DELETE, "/", ticket);
        self.send(builder, ticket).await?;
        debug!(guild_id = ticket.guild_id, ticket_id = ticket.ticket_id, "Deleted transcript");
        Ok(())
    }

    async fn fetch_transcript(&self, ticket: TicketRef) -> ErasureResult<Value> {
        let builder = self.request(Method::GET, "/", ticket);
        let response = self.send(builder, ticket).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| ErasureError::Archive(format!("failed to retrieve transcript: {e}")))?;
        self.codec.decode(&body).await
    }

    async fn store_transcript(&self, ticket: TicketRef, transcript: &Value) -> ErasureResult<()> {
        let encoded = self.codec.encode(transcript).await?;
        let builder = self
            .request(Method::POST, "/import", ticket)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(encoded);
        self.send(builder, ticket).await?;
        debug!(guild_id = ticket.guild_id, ticket_id = ticket.ticket_id, "Imported transcript");
        Ok(())
    }
}
