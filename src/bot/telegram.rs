//! Telegram binding for the chat transport.
//!
//! A private chat is keyed by its chat id. In group chats every member gets a
//! separate session keyed `<chat id>/<sender id>`; outbound messages go to the
//! chat part of the key.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InputFile, UserId as TelegramUserId};
use tracing::{debug, error};

use super::engine::Engine;
use super::transport::ChatTransport;
use crate::session::UserId;

/// Sends outbound messages through the Bot API
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Session key for a message from `sender` in `chat`
///
/// Group messages without a sender (anonymous admins, channel posts) get no key.
pub fn session_user(chat: ChatId, private: bool, sender: Option<TelegramUserId>) -> Option<UserId> {
    if private {
        return Some(UserId::new(chat.0.to_string()));
    }
    sender.map(|sender| UserId::new(format!("{}/{}", chat.0, sender.0)))
}

fn chat_id(user: &UserId) -> Result<ChatId> {
    let chat = user.as_str().split('/').next().unwrap_or_default();
    let id = chat
        .parse::<i64>()
        .with_context(|| format!("Not a Telegram chat id: {user}"))?;
    Ok(ChatId(id))
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, user: &UserId, text: &str) -> Result<()> {
        self.bot.send_message(chat_id(user)?, text).await?;
        Ok(())
    }

    async fn send_image(&self, user: &UserId, png: Vec<u8>, caption: &str) -> Result<()> {
        self.bot
            .send_photo(chat_id(user)?, InputFile::memory(png).file_name("captcha.png"))
            .caption(caption)
            .await?;
        Ok(())
    }
}

/// Dispatcher endpoint for every incoming message
pub async fn message_handler(msg: Message, engine: Arc<Engine>) -> Result<()> {
    let Some(text) = msg.text() else {
        debug!(chat_id = msg.chat.id.0, "Ignoring non-text message");
        return Ok(());
    };

    let sender = msg.from.as_ref().map(|user| user.id);
    let Some(user) = session_user(msg.chat.id, msg.chat.is_private(), sender) else {
        debug!(chat_id = msg.chat.id.0, "Ignoring group message without a sender");
        return Ok(());
    };
    match engine.handle_inbound(user, text.to_string()).await {
        Ok(dispatch) => debug!(chat_id = msg.chat.id.0, ?dispatch, "Handled message"),
        Err(e) => error!(chat_id = msg.chat.id.0, error = %e, "Failed to handle message"),
    }
    Ok(())
}
