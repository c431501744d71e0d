use std::io::Cursor;
use std::sync::Arc;

use teloxide::{net::Download, prelude::*, types::PhotoSize};

use gtb_core::domain::MessageId;
use gtb_core::messaging::types::InboundPhoto;
use tracing::{debug, error, warn};

use crate::handlers::{chat_meta, reply_context, send_apology, sender_of};
use crate::router::AppState;

/// Download the largest available size of the photo into memory.
async fn download_photo(bot: &Bot, photos: &[PhotoSize]) -> anyhow::Result<Vec<u8>> {
    let best = photos
        .last()
        .ok_or_else(|| anyhow::anyhow!("no photo sizes"))?;

    let file = bot.get_file(best.file.id.clone()).await?;
    let mut buf = Cursor::new(Vec::new());
    bot.download_file(&file.path, &mut buf).await?;

    Ok(buf.into_inner())
}

pub async fn handle_photo(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(sender) = sender_of(&msg) else {
        return Ok(());
    };
    let Some(photos) = msg.photo() else {
        return Ok(());
    };

    let chat = chat_meta(&msg);
    let message_id = MessageId(msg.id.0);

    let image = match download_photo(&bot, photos).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("photo download failed in chat {}: {err}", chat.id.0);
            let _ = state
                .messenger
                .send_text(
                    chat.id,
                    "❌ Failed to download the photo. Please try again.",
                    Some(message_id),
                )
                .await;
            return Ok(());
        }
    };

    let ev = InboundPhoto {
        chat,
        sender,
        message_id,
        image,
        caption: msg.caption().map(|s| s.to_string()),
        reply: reply_context(&msg, &state.me),
    };
    let chat_id = ev.chat.id;

    match state.orchestrator.respond_to_photo(ev).await {
        Ok(outcome) => {
            debug!("photo in chat {}: {outcome:?}", chat_id.0);
        }
        Err(err) => {
            error!("photo handler failed in chat {}: {err}", chat_id.0);
            send_apology(&state, chat_id, Some(message_id)).await;
        }
    }

    Ok(())
}
