use std::sync::Arc;

use teloxide::prelude::*;

use gtb_core::domain::MessageId;
use gtb_core::messaging::types::InboundText;
use tracing::{debug, error};

use crate::handlers::{chat_meta, reply_context, send_apology, sender_of};
use crate::router::AppState;

pub async fn handle_text(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(sender) = sender_of(&msg) else {
        return Ok(());
    };
    let Some(text) = msg.text().map(|s| s.to_string()) else {
        return Ok(());
    };

    let ev = InboundText {
        chat: chat_meta(&msg),
        sender,
        message_id: MessageId(msg.id.0),
        text,
        reply: reply_context(&msg, &state.me),
    };
    let chat_id = ev.chat.id;
    let message_id = ev.message_id;

    match state.orchestrator.respond_to_text(ev).await {
        Ok(outcome) => {
            debug!("text in chat {}: {outcome:?}", chat_id.0);
        }
        Err(err) => {
            error!("text handler failed in chat {}: {err}", chat_id.0);
            send_apology(&state, chat_id, Some(message_id)).await;
        }
    }

    Ok(())
}
