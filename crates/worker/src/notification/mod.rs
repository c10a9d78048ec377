//! 完成通知：语言包、消息组件与Discord回调

pub mod components;
pub mod discord_notifier;
pub mod locale;

pub use discord_notifier::{is_token_expired, DiscordNotifier};
pub use locale::{format_message, Locale, LocaleCatalog};
