use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, Result};

/// How the bot receives updates from Telegram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotMode {
    /// Webhook when a public URL can be derived, polling otherwise.
    Auto,
    Polling,
    Webhook,
}

/// Typed configuration, loaded once at startup and immutable thereafter.
#[derive(Clone, Debug)]
pub struct Config {
    // Required secrets
    pub telegram_bot_token: String,
    pub gemini_api_key: String,

    // Optional identity / webhook hints
    pub bot_username: Option<String>,
    pub webhook_url: Option<String>,
    pub mode: BotMode,

    // HTTP server
    pub bind_port: u16,

    // Conversation limits
    pub max_history: usize,
    pub context_messages: usize,
    pub max_message_len: usize,
    pub max_image_bytes: usize,

    // Rate limiting
    pub rate_limit_messages: u32,
    pub rate_limit_window: Duration,

    // Webhook lifecycle
    pub webhook_setup_retries: u32,
    pub webhook_setup_wait: Duration,
    pub webhook_setup_timeout: Duration,

    // Idle-state maintenance
    pub idle_sweep_interval: Duration,
    pub idle_ttl: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let gemini_api_key = env_str("GEMINI_API_KEY").unwrap_or_default();
        if gemini_api_key.trim().is_empty() {
            return Err(Error::Config(
                "GEMINI_API_KEY environment variable is required".to_string(),
            ));
        }

        let bot_username = env_str("TELEGRAM_BOT_USERNAME").and_then(non_empty);
        let webhook_url = env_str("WEBHOOK_URL").and_then(non_empty);

        let mode = match env_str("BOT_MODE").as_deref().map(str::trim) {
            Some("polling") => BotMode::Polling,
            Some("webhook") => BotMode::Webhook,
            _ => BotMode::Auto,
        };

        let bind_port = env_u16("PORT").unwrap_or(8080);

        let max_history = env_usize("MAX_CONVERSATION_HISTORY").unwrap_or(20);
        let context_messages = env_usize("CONTEXT_MESSAGES").unwrap_or(10);
        let max_message_len = env_usize("MAX_MESSAGE_LENGTH").unwrap_or(4096);
        let max_image_bytes = env_usize("MAX_IMAGE_SIZE").unwrap_or(20 * 1024 * 1024);

        let rate_limit_messages = env_u32("RATE_LIMIT_MESSAGES").unwrap_or(10);
        let rate_limit_window = Duration::from_secs(env_u64("RATE_LIMIT_WINDOW").unwrap_or(60));

        let webhook_setup_retries = env_u32("WEBHOOK_SETUP_RETRIES").unwrap_or(3);
        let webhook_setup_wait =
            Duration::from_secs(env_u64("WEBHOOK_SETUP_WAIT_SECONDS").unwrap_or(5));
        let webhook_setup_timeout =
            Duration::from_secs(env_u64("WEBHOOK_SETUP_TIMEOUT_SECONDS").unwrap_or(120));

        let idle_sweep_interval =
            Duration::from_secs(env_u64("IDLE_SWEEP_INTERVAL_SECONDS").unwrap_or(3600));
        let idle_ttl = Duration::from_secs(env_u64("IDLE_TTL_SECONDS").unwrap_or(24 * 3600));

        Ok(Self {
            telegram_bot_token,
            gemini_api_key,
            bot_username,
            webhook_url,
            mode,
            bind_port,
            max_history,
            context_messages,
            max_message_len,
            max_image_bytes,
            rate_limit_messages,
            rate_limit_window,
            webhook_setup_retries,
            webhook_setup_wait,
            webhook_setup_timeout,
            idle_sweep_interval,
            idle_ttl,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_u16(key: &str) -> Option<u16> {
    env_str(key).and_then(|s| s.trim().parse::<u16>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
