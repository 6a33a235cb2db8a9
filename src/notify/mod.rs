//! Operator notifications

pub mod format;
pub mod telegram;

pub use format::format_session_message;
pub use telegram::{LogNotifier, TelegramNotifier};
