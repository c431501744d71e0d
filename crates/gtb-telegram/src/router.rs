use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use gtb_core::{
    config::{BotMode, Config},
    conversation::ConversationStore,
    domain::UserId,
    messaging::{port::MessagingPort, types::BotIdentity},
    model::ModelPort,
    orchestrator::ResponseOrchestrator,
    stats::BotStats,
    webhook::{HostingSignals, WebhookLifecycle},
};

use crate::handlers;
use crate::server;
use crate::TelegramMessenger;

pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Arc<ConversationStore>,
    pub stats: Arc<BotStats>,
    pub model: Arc<dyn ModelPort>,
    pub messenger: Arc<dyn MessagingPort>,
    pub orchestrator: Arc<ResponseOrchestrator>,
    pub chat_locks: Arc<ChatLocks>,
    pub me: BotIdentity,
}

#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Wire everything up and run until the transport stops.
pub async fn run(cfg: Arc<Config>, model: Arc<dyn ModelPort>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = match bot.get_me().await {
        Ok(me) => BotIdentity {
            id: Some(UserId(me.user.id.0 as i64)),
            username: Some(me.username().to_string()),
        },
        Err(err) => {
            warn!("failed to fetch bot identity: {err}");
            BotIdentity {
                id: None,
                username: cfg.bot_username.clone(),
            }
        }
    };
    if let Some(username) = &me.username {
        info!("bot started: @{username}");
    }

    let stats = Arc::new(BotStats::new());
    let store = Arc::new(ConversationStore::new(stats.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let orchestrator = Arc::new(ResponseOrchestrator::new(
        cfg.clone(),
        store.clone(),
        model.clone(),
        messenger.clone(),
        stats.clone(),
        me.clone(),
    ));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        store,
        stats,
        model,
        messenger,
        orchestrator,
        chat_locks: Arc::new(ChatLocks::default()),
        me,
    });

    spawn_maintenance(state.clone());

    match resolve_mode(&cfg) {
        BotMode::Webhook => run_webhook(bot, state).await,
        _ => run_polling(bot, state).await,
    }
}

fn resolve_mode(cfg: &Config) -> BotMode {
    match cfg.mode {
        BotMode::Auto => {
            if HostingSignals::from_env(cfg).candidate_urls().is_empty() {
                BotMode::Polling
            } else {
                BotMode::Webhook
            }
        }
        other => other,
    }
}

/// Hourly sweep dropping idle conversations and expired rate windows, so the
/// chat-keyed maps do not grow for the lifetime of the process.
fn spawn_maintenance(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(state.cfg.idle_sweep_interval);
        tick.tick().await; // the first tick fires immediately; skip it

        loop {
            tick.tick().await;
            let removed = state.store.evict_idle(state.cfg.idle_ttl).await;
            state.orchestrator.purge_idle_windows().await;
            if removed > 0 {
                info!("evicted {removed} idle conversations");
            }
        }
    });
}

async fn run_polling(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    info!("starting in polling mode");

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn run_webhook(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    info!("starting in webhook mode on port {}", state.cfg.bind_port);

    // Registration runs as a supervised one-shot task; its failure leaves
    // the bot serving HTTP in a degraded state, never down.
    let lifecycle = WebhookLifecycle::new(state.cfg.clone(), state.messenger.clone());
    let signals = HostingSignals::from_env(&state.cfg);
    let outcome = lifecycle.spawn(signals);
    tokio::spawn(async move {
        match outcome.await {
            Ok(true) => info!("automatic webhook setup completed"),
            Ok(false) => warn!("webhook setup failed; updates will not arrive until a webhook is registered"),
            Err(_) => warn!("webhook setup task was dropped before finishing"),
        }
    });

    server::serve(bot, state).await
}
