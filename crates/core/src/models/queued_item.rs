use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::ErasureRequest;
use crate::errors::{ErasureError, ErasureResult};

/// 当前写出的信封版本
pub const ENVELOPE_VERSION: u32 = 1;

/// 队列条目的唯一标识，入队时分配
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_version() -> u32 {
    ENVELOPE_VERSION
}

/// 队列中持久化的请求信封
///
/// 线上格式为JSON，字段名与生产方保持一致。未知字段保存在 `extra` 中，
/// 重写条目时原样写回。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedItem {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub request_id: RequestId,
    #[serde(rename = "request")]
    pub payload: ErasureRequest,
    #[serde(rename = "queued_at")]
    pub enqueued_at: DateTime<Utc>,
    #[serde(rename = "retry_count", default)]
    pub attempt: u32,
    #[serde(
        rename = "last_attempt_at",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_claimed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueuedItem {
    pub fn new(payload: ErasureRequest) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            request_id: RequestId::generate(),
            payload,
            enqueued_at: Utc::now(),
            attempt: 0,
            last_claimed_at: None,
            extra: Map::new(),
        }
    }

    pub fn decode(raw: &str) -> ErasureResult<Self> {
        serde_json::from_str(raw).map_err(|e| ErasureError::MalformedItem(e.to_string()))
    }

    pub fn encode(&self) -> ErasureResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 标记一次认领，旧条目缺少ID时在此补齐
    pub fn mark_claimed(&mut self, at: DateTime<Utc>) {
        if self.request_id.is_empty() {
            self.request_id = RequestId::generate();
        }
        self.last_claimed_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestKind;

    #[test]
    fn test_new_item_defaults() {
        let item = QueuedItem::new(ErasureRequest::new(RequestKind::AllContentForUser, 7));
        assert_eq!(item.version, ENVELOPE_VERSION);
        assert_eq!(item.attempt, 0);
        assert!(item.last_claimed_at.is_none());
        assert!(!item.request_id.is_empty());
    }

    #[test]
    fn test_decode_legacy_envelope() {
        let raw = r#"{"request":{"type":0,"user_id":1,"guild_ids":[5]},
            "queued_at":"2024-05-01T10:00:00Z","retry_count":2,
            "last_attempt_at":"0001-01-01T00:00:00Z","request_id":"legacy-1"}"#;
        let item = QueuedItem::decode(raw).unwrap();

        assert_eq!(item.version, 1);
        assert_eq!(item.request_id.as_str(), "legacy-1");
        assert_eq!(item.attempt, 2);
        assert_eq!(item.payload.scope_ids, vec![5]);
    }

    #[test]
    fn test_unknown_fields_survive_rewrite() {
        let raw = r#"{"version":1,"request_id":"r1","request":{"type":2,"user_id":1},
            "queued_at":"2024-05-01T10:00:00Z","retry_count":0,"source":"dashboard"}"#;
        let item = QueuedItem::decode(raw).unwrap();
        assert_eq!(item.extra.get("source"), Some(&Value::from("dashboard")));

        let rewritten: Value = serde_json::from_str(&item.encode().unwrap()).unwrap();
        assert_eq!(rewritten["source"], "dashboard");
        assert_eq!(rewritten["request_id"], "r1");
    }

    #[test]
    fn test_claim_assigns_missing_id() {
        let raw = r#"{"request":{"type":2,"user_id":1},"queued_at":"2024-05-01T10:00:00Z"}"#;
        let mut item = QueuedItem::decode(raw).unwrap();
        assert!(item.request_id.is_empty());

        item.mark_claimed(Utc::now());
        assert!(!item.request_id.is_empty());
        assert!(item.last_claimed_at.is_some());
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = QueuedItem::decode("{not json").unwrap_err();
        assert!(matches!(err, ErasureError::MalformedItem(_)));
    }
}
