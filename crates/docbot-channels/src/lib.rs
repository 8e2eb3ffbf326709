pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

pub use telegram::TelegramMessenger;

/// Who the bot is, as reported by the messaging provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: u64,
    pub username: Option<String>,
}

/// Outbound side of the chat provider.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends plain text, no markup parsing.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Connectivity check; fails on a bad token or unreachable API.
    async fn probe(&self) -> Result<BotIdentity>;

    /// Token with its middle masked out, safe to show in chat.
    fn token_hint(&self) -> String;
}
