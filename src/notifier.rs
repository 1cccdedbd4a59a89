use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{ChatId, ParseMode, Recipient},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
    #[error("Invalid chat id: {0}")]
    InvalidChat(String),
}

#[derive(Debug, Clone)]
pub struct SendOptions {
    pub parse_mode: Option<ParseMode>,
    pub link_preview: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            parse_mode: Some(ParseMode::Html),
            link_preview: false,
        }
    }
}

/// Outbound chat messaging used by the whale monitor.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        channel_id: &str,
        message: &str,
        options: SendOptions,
    ) -> Result<(), TransportError>;
}

/// Accepts numeric chat ids as well as `@channelusername`.
pub fn parse_recipient(channel_id: &str) -> Result<Recipient, TransportError> {
    let channel_id = channel_id.trim();
    if channel_id.starts_with('@') && channel_id.len() > 1 {
        return Ok(Recipient::ChannelUsername(channel_id.to_string()));
    }
    channel_id
        .parse::<i64>()
        .map(|id| Recipient::Id(ChatId(id)))
        .map_err(|_| TransportError::InvalidChat(channel_id.to_string()))
}

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(
        &self,
        channel_id: &str,
        message: &str,
        options: SendOptions,
    ) -> Result<(), TransportError> {
        let recipient = parse_recipient(channel_id)?;
        let mut request = self
            .bot
            .send_message(recipient, message)
            .disable_web_page_preview(!options.link_preview);
        if let Some(mode) = options.parse_mode {
            request = request.parse_mode(mode);
        }
        request.await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recipient() {
        assert_eq!(
            parse_recipient("-1001234567890").unwrap(),
            Recipient::Id(ChatId(-1001234567890))
        );
        assert_eq!(
            parse_recipient(" @whale_alerts ").unwrap(),
            Recipient::ChannelUsername("@whale_alerts".to_string())
        );
        assert!(parse_recipient("not-a-chat").is_err());
        assert!(parse_recipient("@").is_err());
    }

    #[test]
    fn default_options_use_html_without_preview() {
        let options = SendOptions::default();
        assert_eq!(options.parse_mode, Some(ParseMode::Html));
        assert!(!options.link_preview);
    }
}
