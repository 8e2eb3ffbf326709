use anyhow::{Context, Result};
use async_trait::async_trait;
use docbot_auth::mask_secret;
use teloxide::prelude::*;

use crate::{BotIdentity, Messenger};

/// Telegram Bot API client used for replies and diagnostics.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    token: String,
}

impl TelegramMessenger {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            bot: Bot::new(&token),
            token,
        }
    }

    /// Points the client at another Bot API server (self-hosted or a mock).
    pub fn with_api_url(mut self, api_url: &str) -> Result<Self> {
        let url = reqwest::Url::parse(api_url)
            .with_context(|| format!("invalid telegram api url: {api_url}"))?;
        self.bot = self.bot.set_api_url(url);
        Ok(self)
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .with_context(|| format!("failed to send message to chat {chat_id}"))?;
        tracing::debug!(chat_id, chars = text.len(), "message sent");
        Ok(())
    }

    async fn probe(&self) -> Result<BotIdentity> {
        let me = self
            .bot
            .get_me()
            .await
            .context("telegram getMe failed")?;
        Ok(BotIdentity {
            id: me.user.id.0,
            username: me.user.username.clone(),
        })
    }

    fn token_hint(&self) -> String {
        mask_secret(&self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hint_masks_middle() {
        let messenger = TelegramMessenger::new("1234567890:AAEabcdefghijklmnopqrstuvwxyz");
        assert_eq!(messenger.token_hint(), "12345*****vwxyz");
    }

    #[test]
    fn invalid_api_url_is_rejected() {
        assert!(TelegramMessenger::new("t").with_api_url("not a url").is_err());
    }
}
