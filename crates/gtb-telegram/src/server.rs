//! Webhook + health HTTP server (axum).
//!
//! The health endpoints double as the accessibility target for the webhook
//! lifecycle's probes, so `/health` must answer with a `"status": "healthy"`
//! marker.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use teloxide::{prelude::*, types::UpdateKind};
use tracing::{debug, error, info, warn};

use crate::handlers;
use crate::router::AppState;

#[derive(Clone)]
struct ServerState {
    bot: Bot,
    app: Arc<AppState>,
}

pub async fn serve(bot: Bot, app: Arc<AppState>) -> anyhow::Result<()> {
    let port = app.cfg.bind_port;
    let state = ServerState { bot, app };

    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/set_webhook", post(set_webhook))
        .route("/bot_info", get(bot_info))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("http server listening on {addr}");

    axum::serve(listener, router).await?;
    Ok(())
}

async fn root(State(state): State<ServerState>) -> Json<Value> {
    let model_health = state.app.model.health_check().await;

    Json(json!({
        "status": "healthy",
        "service": "Gemini Telegram Bot",
        "version": env!("CARGO_PKG_VERSION"),
        "model_status": model_health.status,
        "features": [
            "AI Conversations",
            "Image Analysis",
            "Image Generation",
            "Group Chat Support",
        ],
    }))
}

async fn health(State(state): State<ServerState>) -> Json<Value> {
    let model_health = state.app.model.health_check().await;
    let stats = state.app.stats.snapshot();

    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "bot": {
            "status": "running",
            "statistics": stats,
            "active_conversations": state.app.store.count().await,
        },
        "model": model_health,
        "system": {
            "webhook_configured": state.app.cfg.webhook_url.is_some(),
            "rate_limiting": true,
            "conversation_history": true,
        },
    }))
}

async fn webhook(
    State(state): State<ServerState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let update: Update = match serde_json::from_value(payload) {
        Ok(update) => update,
        Err(err) => {
            warn!("failed to parse webhook update: {err}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "message": "invalid update payload" })),
            );
        }
    };

    debug!("received webhook update {}", update.id);

    if let UpdateKind::Message(msg) = update.kind {
        // Processing can involve slow model calls; answer the platform
        // immediately and handle the message in the background.
        let bot = state.bot.clone();
        let app = state.app.clone();
        tokio::spawn(async move {
            if let Err(err) = handlers::handle_message(bot, msg, app).await {
                error!("webhook handler error: {err}");
            }
        });
    }

    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

#[derive(Deserialize)]
struct SetWebhookRequest {
    webhook_url: String,
}

async fn set_webhook(
    State(state): State<ServerState>,
    Json(req): Json<SetWebhookRequest>,
) -> (StatusCode, Json<Value>) {
    if req.webhook_url.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "message": "webhook_url is required" })),
        );
    }

    match state.app.messenger.register_webhook(&req.webhook_url).await {
        Ok(()) => {
            info!("webhook set to {}", req.webhook_url);
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "webhook_url": req.webhook_url,
                })),
            )
        }
        Err(err) => {
            error!("manual webhook registration failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": "failed to set webhook" })),
            )
        }
    }
}

async fn bot_info(State(state): State<ServerState>) -> Json<Value> {
    let cfg = &state.app.cfg;

    Json(json!({
        "configuration": {
            "has_telegram_token": !cfg.telegram_bot_token.is_empty(),
            "has_gemini_key": !cfg.gemini_api_key.is_empty(),
            "has_webhook_url": cfg.webhook_url.is_some(),
            "bot_username": state.app.me.username,
            "max_history": cfg.max_history,
        },
        "statistics": state.app.stats.snapshot(),
        "active_conversations": state.app.store.count().await,
        "commands": [
            { "command": "/start", "description": "Welcome message" },
            { "command": "/help", "description": "Show help" },
            { "command": "/image", "description": "Generate an AI image" },
            { "command": "/clear", "description": "Clear conversation history" },
            { "command": "/health", "description": "Bot health check" },
            { "command": "/groupid", "description": "Show this chat's id" },
        ],
    }))
}
