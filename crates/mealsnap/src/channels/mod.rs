//! Telegram platform plumbing.
//!
//! Wire types and Bot API client, plus the single inbound value type both
//! delivery modes (webhook POST, getUpdates poll) converge on.

mod inbound;
mod telegram;

pub use inbound::InboundUpdate;
pub use telegram::{
    BotApi, PhotoSize, TelegramBot, TelegramChat, TelegramError, TelegramMessage, TelegramUpdate,
};
