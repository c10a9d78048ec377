//! Discord components v2 消息构造

use serde_json::{json, Value};

pub const FLAG_EPHEMERAL: u64 = 1 << 6;
pub const FLAG_COMPONENTS_V2: u64 = 1 << 15;

const TYPE_CONTAINER: u8 = 17;
const TYPE_TEXT_DISPLAY: u8 = 10;
const TYPE_SEPARATOR: u8 = 14;

/// 容器左侧的强调色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accent {
    Success,
    Error,
}

impl Accent {
    pub fn rgb(&self) -> u32 {
        match self {
            Accent::Success => 0x2ECC71,
            Accent::Error => 0xE74C3C,
        }
    }
}

pub fn text_display(content: impl Into<String>) -> Value {
    json!({ "type": TYPE_TEXT_DISPLAY, "content": content.into() })
}

pub fn separator() -> Value {
    json!({ "type": TYPE_SEPARATOR })
}

/// 标题、分隔线加正文组件
pub fn container(accent: Accent, title: &str, body: Vec<Value>) -> Value {
    let mut components = vec![text_display(format!("### {title}")), separator()];
    components.extend(body);

    json!({
        "type": TYPE_CONTAINER,
        "accent_color": accent.rgb(),
        "components": components,
    })
}

/// 编辑原始响应或发送私信使用的消息体
pub fn components_message(components: Vec<Value>) -> Value {
    json!({ "components": components, "flags": FLAG_COMPONENTS_V2 })
}

pub fn ephemeral_message(content: impl Into<String>) -> Value {
    json!({ "content": content.into(), "flags": FLAG_EPHEMERAL })
}
