use std::sync::Arc;

use teloxide::prelude::*;

use gtb_core::{
    conversation::{MessageKind, StoredMessage},
    domain::{ChatKind, MessageId},
    formatting::format_uptime,
    messaging::types::{ImageRequest, Sender},
    model::HealthStatus,
    Result,
};
use tracing::error;

use crate::handlers::{chat_meta, reply_context, send_apology, sender_of};
use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(sender) = sender_of(&msg) else {
        return Ok(());
    };
    let text = msg.text().unwrap_or("").to_string();
    let (cmd, args) = parse_command(&text);

    let result = match cmd.as_str() {
        "start" => start(&msg, &state, &sender).await,
        "help" => help(&msg, &state).await,
        "clear" => clear(&msg, &state).await,
        "health" => health(&msg, &state).await,
        "groupid" => groupid(&msg, &state).await,
        "image" => image(&msg, &state, &sender, args).await,
        // Unknown commands are not ours to answer (another bot in the
        // group may own them).
        _ => Ok(()),
    };

    if let Err(err) = result {
        error!("command /{cmd} failed in chat {}: {err}", msg.chat.id.0);
        send_apology(&state, chat_meta(&msg).id, Some(MessageId(msg.id.0))).await;
    }

    Ok(())
}

fn bot_handle(state: &AppState) -> String {
    state
        .me
        .username
        .as_deref()
        .map(|u| format!("@{u}"))
        .unwrap_or_else(|| "this bot".to_string())
}

async fn start(msg: &Message, state: &AppState, sender: &Sender) -> Result<()> {
    let meta = chat_meta(msg);
    let handle = bot_handle(state);
    let name = msg
        .from()
        .map(|u| u.first_name.clone())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "there".to_string());

    let welcome = format!(
        "🤖 Welcome to Gemini AI Assistant, {name}!\n\n\
         I'm {handle}, an AI-powered bot:\n\n\
         💬 Smart conversations - just start typing\n\
         📸 Photo analysis - send me an image\n\
         🎨 Image generation - use /image <description>\n\
         👥 Group support - mention {handle} or reply to my messages\n\n\
         Use /help for all commands. Ready to assist you! 🌟"
    );

    state
        .messenger
        .send_text(meta.id, &welcome, Some(MessageId(msg.id.0)))
        .await?;

    // /start counts as conversation history like any other command message.
    let reply = reply_context(msg, &state.me);
    state.store.get_or_create(&meta).await;
    state
        .store
        .append(
            meta.id,
            StoredMessage::inbound(
                MessageKind::Command,
                meta.id,
                sender,
                MessageId(msg.id.0),
                "/start",
                reply.as_ref(),
            ),
            state.cfg.max_history,
        )
        .await;

    Ok(())
}

async fn help(msg: &Message, state: &AppState) -> Result<()> {
    let handle = bot_handle(state);
    let help_text = format!(
        "🤖 Gemini AI Assistant - Help\n\n\
         Commands:\n\
         • /start - Welcome message\n\
         • /help - Show this help\n\
         • /image <description> - Generate an AI image\n\
         • /clear - Clear conversation history\n\
         • /health - Check bot status\n\
         • /groupid - Show this chat's id\n\n\
         Features:\n\
         • Text chat - just type any message\n\
         • Photo analysis - send an image, optionally with a caption\n\
         • Group chat - mention {handle} or reply to my messages\n\n\
         I remember the recent context of our conversation, so follow-up \
         questions work."
    );

    state
        .messenger
        .send_text(chat_meta(msg).id, &help_text, Some(MessageId(msg.id.0)))
        .await?;
    Ok(())
}

async fn clear(msg: &Message, state: &AppState) -> Result<()> {
    let meta = chat_meta(msg);
    state.store.clear(meta.id).await;

    state
        .messenger
        .send_text(
            meta.id,
            "🧹 Conversation history cleared! Starting fresh.",
            Some(MessageId(msg.id.0)),
        )
        .await?;
    Ok(())
}

async fn health(msg: &Message, state: &AppState) -> Result<()> {
    let model_health = state.model.health_check().await;
    let stats = state.stats.snapshot();

    let status_emoji = match model_health.status {
        HealthStatus::Healthy => "✅",
        HealthStatus::Degraded => "⚠️",
        HealthStatus::Unhealthy => "❌",
    };
    let flag = |b: bool| if b { "✅" } else { "❌" };

    let text = format!(
        "🏥 Bot health {status_emoji}\n\n\
         Text generation: {}\n\n\
         Statistics:\n\
         • Messages processed: {}\n\
         • Images analyzed: {}\n\
         • Images generated: {}\n\
         • Active conversations: {}\n\
         • Uptime: {}\n\n\
         Configuration:\n\
         • Max history: {} messages\n\
         • Bot username: {}\n\n\
         Models:\n\
         • Chat: {}\n\
         • Vision: {}\n\
         • Image gen: {}",
        flag(model_health.text_generation),
        stats.total_messages,
        stats.total_images_analyzed,
        stats.total_images_generated,
        state.store.count().await,
        format_uptime(state.stats.started_at()),
        state.cfg.max_history,
        state.me.username.as_deref().unwrap_or("not set"),
        model_health.models.chat,
        model_health.models.vision,
        model_health.models.image_generation,
    );

    state
        .messenger
        .send_text(chat_meta(msg).id, &text, Some(MessageId(msg.id.0)))
        .await?;
    Ok(())
}

async fn groupid(msg: &Message, state: &AppState) -> Result<()> {
    let meta = chat_meta(msg);

    let text = if meta.kind == ChatKind::Private {
        let user = msg.from();
        format!(
            "💬 Private chat\n\n\
             🆔 Your user id: {}\n\
             👤 Name: {}\n\
             🔗 Chat id: {}",
            user.map(|u| u.id.0.to_string()).unwrap_or_default(),
            user.map(|u| u.first_name.clone()).unwrap_or_default(),
            meta.id.0,
        )
    } else {
        format!(
            "🏢 Group information\n\n\
             🆔 Group id: {}\n\
             📝 Name: {}\n\
             📊 Type: {}",
            meta.id.0,
            meta.title.as_deref().unwrap_or("Unknown"),
            meta.kind.as_str(),
        )
    };

    state
        .messenger
        .send_text(meta.id, &text, Some(MessageId(msg.id.0)))
        .await?;
    Ok(())
}

async fn image(msg: &Message, state: &AppState, sender: &Sender, prompt: String) -> Result<()> {
    let ev = ImageRequest {
        chat: chat_meta(msg),
        sender: sender.clone(),
        message_id: MessageId(msg.id.0),
        prompt,
    };

    state.orchestrator.generate_image(ev).await?;
    Ok(())
}
