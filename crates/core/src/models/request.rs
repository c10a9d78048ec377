use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 擦除请求类型，线上以整数编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RequestKind {
    /// 删除某个服务器下的全部归档记录
    AllRecordsForOwner,
    /// 删除某个服务器下指定的归档记录
    SpecificRecordsForOwner,
    /// 抹除用户在所有归档中的内容
    AllContentForUser,
    /// 抹除用户在指定归档中的内容
    SpecificContentForUser,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::AllRecordsForOwner => "all_transcripts",
            RequestKind::SpecificRecordsForOwner => "specific_transcripts",
            RequestKind::AllContentForUser => "all_messages",
            RequestKind::SpecificContentForUser => "specific_messages",
        }
    }

    /// 该类型的请求是否针对归档记录本身（而非其中的消息内容）
    pub fn targets_records(&self) -> bool {
        matches!(
            self,
            RequestKind::AllRecordsForOwner | RequestKind::SpecificRecordsForOwner
        )
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for RequestKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RequestKind::AllRecordsForOwner),
            1 => Ok(RequestKind::SpecificRecordsForOwner),
            2 => Ok(RequestKind::AllContentForUser),
            3 => Ok(RequestKind::SpecificContentForUser),
            other => Err(format!("unknown erasure request type: {other}")),
        }
    }
}

impl From<RequestKind> for u8 {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::AllRecordsForOwner => 0,
            RequestKind::SpecificRecordsForOwner => 1,
            RequestKind::AllContentForUser => 2,
            RequestKind::SpecificContentForUser => 3,
        }
    }
}

/// 回调请求方所需的交互上下文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackContext {
    #[serde(rename = "interaction_token")]
    pub token: String,
    pub application_id: u64,
    #[serde(
        rename = "interaction_guild_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub guild_id: Option<u64>,
}

impl CallbackContext {
    pub fn is_deliverable(&self) -> bool {
        !self.token.is_empty() && self.application_id != 0
    }
}

/// 一次数据擦除请求，入队后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureRequest {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    #[serde(rename = "user_id")]
    pub subject_user_id: u64,
    #[serde(rename = "guild_ids", default, skip_serializing_if = "Vec::is_empty")]
    pub scope_ids: Vec<u64>,
    #[serde(rename = "ticket_ids", default, skip_serializing_if = "Vec::is_empty")]
    pub item_ids: Vec<i64>,
    /// 服务器显示名称，以十进制ID为键
    #[serde(
        rename = "guild_names",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub scope_names: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackContext>,
}

impl ErasureRequest {
    pub fn new(kind: RequestKind, subject_user_id: u64) -> Self {
        Self {
            kind,
            subject_user_id,
            scope_ids: Vec::new(),
            item_ids: Vec::new(),
            scope_names: BTreeMap::new(),
            language: None,
            callback: None,
        }
    }

    pub fn with_scopes(mut self, scope_ids: Vec<u64>) -> Self {
        self.scope_ids = scope_ids;
        self
    }

    pub fn with_items(mut self, item_ids: Vec<i64>) -> Self {
        self.item_ids = item_ids;
        self
    }

    pub fn with_callback(mut self, callback: CallbackContext) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_scope_name(mut self, scope_id: u64, name: impl Into<String>) -> Self {
        self.scope_names.insert(scope_id.to_string(), name.into());
        self
    }

    /// 需要通知请求方时返回回调上下文
    pub fn deliverable_callback(&self) -> Option<&CallbackContext> {
        self.callback.as_ref().filter(|c| c.is_deliverable())
    }

    /// 服务器显示文本：有名称时为 `名称 (ID)`，否则为 ID
    pub fn scope_display(&self, scope_id: u64) -> String {
        match self.scope_names.get(&scope_id.to_string()) {
            Some(name) if !name.is_empty() => format!("{name} ({scope_id})"),
            _ => scope_id.to_string(),
        }
    }

    /// 日志中使用的用户标识，不输出原始ID
    pub fn scrambled_subject(&self) -> String {
        scramble_user_id(self.subject_user_id)
    }
}

/// 对用户ID做SHA-256摘要
pub fn scramble_user_id(user_id: u64) -> String {
    format!("{:x}", Sha256::digest(user_id.to_string().as_bytes()))
}
