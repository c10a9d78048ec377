//! 归档中的用户内容抹除
//!
//! 归档以JSON文档形式处理，只改写与用户相关的字段，其余字段原样保留：
//!
//! ```json
//! {"entities": {"users": {"<id>": {...}}, "channels": {...}, "roles": {...}},
//!  "messages": [{"author_id": ..., "content": "...", "embeds": [], "attachments": []}]}
//! ```

use serde_json::{json, Map, Value};

pub const REDACTED_CONTENT: &str =
    "[This message was removed in accordance with data protection regulations]";
pub const REDACTED_USERNAME: &str = "Removed for privacy";

/// 抹除 `user_id` 发送的全部消息，返回被抹除的消息数量
///
/// 被抹除的消息作者改为 0，内容替换为固定文本，嵌入和附件清空；
/// 用户实体替换为匿名用户。
pub fn redact_user(transcript: &mut Value, user_id: u64) -> u64 {
    let Some(root) = transcript.as_object_mut() else {
        return 0;
    };

    let mut redacted = 0;
    let mut string_ids = false;
    if let Some(messages) = root.get_mut("messages").and_then(Value::as_array_mut) {
        for message in messages.iter_mut().filter_map(Value::as_object_mut) {
            let is_string = match message.get("author_id") {
                Some(author) if snowflake(author) == Some(user_id) => author.is_string(),
                _ => continue,
            };

            string_ids |= is_string;
            message.insert("author_id".to_string(), anonymous_id(is_string));
            message.insert("content".to_string(), Value::from(REDACTED_CONTENT));
            message.insert("embeds".to_string(), Value::Array(Vec::new()));
            message.insert("attachments".to_string(), Value::Array(Vec::new()));
            redacted += 1;
        }
    }

    if let Some(entities) = object_entry(root, "entities") {
        for name in ["channels", "roles"] {
            object_entry(entities, name);
        }
        if let Some(users) = object_entry(entities, "users") {
            let anonymous = json!({
                "id": anonymous_id(string_ids),
                "username": REDACTED_USERNAME,
                "avatar": "",
                "bot": false,
            });
            users.insert(user_id.to_string(), anonymous.clone());
            users.insert("0".to_string(), anonymous);
        }
    }

    redacted
}

/// ID字段可能以数字或字符串编码
fn snowflake(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn anonymous_id(as_string: bool) -> Value {
    if as_string {
        Value::from("0")
    } else {
        Value::from(0u64)
    }
}

/// 取得对象字段，缺失或不是对象时替换为空对象
fn object_entry<'a>(
    parent: &'a mut Map<String, Value>,
    key: &str,
) -> Option<&'a mut Map<String, Value>> {
    let entry = parent
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    entry.as_object_mut()
}
