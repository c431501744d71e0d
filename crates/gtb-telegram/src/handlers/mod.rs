//! Telegram update handlers.
//!
//! Each handler maps the teloxide update into core types, hands it to the
//! orchestrator, and converts any error into a generic apology so a broken
//! update can never crash the process or leak internals.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use gtb_core::domain::{ChatId, ChatKind, MessageId, UserId};
use gtb_core::messaging::types::{BotIdentity, ChatMeta, ReplyContext, Sender};

use crate::router::AppState;

mod commands;
mod photo;
mod text;

const APOLOGY: &str =
    "❌ I'm sorry, I encountered an error processing your message. Please try again.";

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(msg, state).await;
        }
    }

    if msg.text().is_some() {
        // Sequentialize messages per chat so history updates stay ordered.
        let _guard = state.chat_locks.lock_chat(chat_id).await;
        return text::handle_text(msg, state).await;
    }

    if msg.photo().is_some() {
        let _guard = state.chat_locks.lock_chat(chat_id).await;
        return photo::handle_photo(bot, msg, state).await;
    }

    Ok(())
}

pub(crate) fn chat_meta(msg: &Message) -> ChatMeta {
    let kind = if msg.chat.is_group() {
        ChatKind::Group
    } else if msg.chat.is_supergroup() {
        ChatKind::Supergroup
    } else if msg.chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Private
    };

    ChatMeta {
        id: ChatId(msg.chat.id.0),
        kind,
        title: msg.chat.title().map(|s| s.to_string()),
        member_count: None,
    }
}

pub(crate) fn sender_of(msg: &Message) -> Option<Sender> {
    msg.from().map(|u| Sender {
        id: UserId(u.id.0 as i64),
        username: u.username.clone(),
    })
}

pub(crate) fn reply_context(msg: &Message, me: &BotIdentity) -> Option<ReplyContext> {
    let replied = msg.reply_to_message()?;

    let is_reply_to_bot = replied
        .from()
        .map(|u| {
            u.is_bot
                && me
                    .id
                    .map(|id| id.0 == u.id.0 as i64)
                    // Identity unknown: any bot-authored message counts.
                    .unwrap_or(true)
        })
        .unwrap_or(false);

    Some(ReplyContext {
        message_id: MessageId(replied.id.0),
        is_reply_to_bot,
        preview: replied.text().map(|s| s.to_string()),
    })
}

pub(crate) async fn send_apology(state: &AppState, chat_id: ChatId, reply_to: Option<MessageId>) {
    let _ = state.messenger.send_text(chat_id, APOLOGY, reply_to).await;
}
