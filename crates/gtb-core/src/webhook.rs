//! Automatic webhook setup: detect a reachable public URL, health-check it,
//! and register it with the platform.
//!
//! Runs as a one-shot supervised task with an overall timeout and a result
//! channel; its failure leaves the process running in a degraded
//! (non-webhook) state and is never fatal.

use std::{env, sync::Arc, time::Duration};

use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{config::Config, messaging::port::MessagingPort};

const PROBE_BACKOFF: Duration = Duration::from_secs(2);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment hints a hosting platform exposes about the public URL.
///
/// Constructed from the environment at startup; tests build it directly.
#[derive(Clone, Debug, Default)]
pub struct HostingSignals {
    pub repl_id: Option<String>,
    pub repl_slug: Option<String>,
    pub repl_owner: Option<String>,
    pub custom_domain: Option<String>,
    pub configured_url: Option<String>,
}

impl HostingSignals {
    pub fn from_env(cfg: &Config) -> Self {
        Self {
            repl_id: env::var("REPL_ID").ok(),
            repl_slug: env::var("REPL_SLUG").ok(),
            repl_owner: env::var("REPL_OWNER").ok(),
            custom_domain: env::var("CUSTOM_DOMAIN").ok(),
            configured_url: cfg.webhook_url.clone(),
        }
    }

    /// Candidate public base URLs, most specific first, deduplicated.
    pub fn candidate_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();

        if let (Some(slug), Some(owner)) = (&self.repl_slug, &self.repl_owner) {
            push_unique(&mut urls, format!("https://{slug}.{owner}.repl.co"));
        }

        if let Some(id) = &self.repl_id {
            push_unique(&mut urls, format!("https://{id}.replit.app"));
        }

        if let Some(domain) = &self.custom_domain {
            let url = if domain.starts_with("http") {
                domain.clone()
            } else {
                format!("https://{domain}")
            };
            push_unique(&mut urls, url);
        }

        // A configured webhook URL contributes its origin only.
        if let Some(configured) = &self.configured_url {
            if let Ok(parsed) = reqwest::Url::parse(configured) {
                if let Some(host) = parsed.host_str() {
                    let mut base = format!("{}://{host}", parsed.scheme());
                    if let Some(port) = parsed.port() {
                        base.push_str(&format!(":{port}"));
                    }
                    push_unique(&mut urls, base);
                }
            }
        }

        urls
    }
}

fn push_unique(urls: &mut Vec<String>, url: String) {
    if !urls.contains(&url) {
        urls.push(url);
    }
}

pub struct WebhookLifecycle {
    cfg: Arc<Config>,
    messenger: Arc<dyn MessagingPort>,
    http: reqwest::Client,
}

impl WebhookLifecycle {
    pub fn new(cfg: Arc<Config>, messenger: Arc<dyn MessagingPort>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .expect("reqwest client build");
        Self {
            cfg,
            messenger,
            http,
        }
    }

    /// Probe a candidate base URL from the outside: its health endpoint must
    /// answer 200 with a `"status": "healthy"` marker.
    async fn probe(&self, base: &str) -> bool {
        let url = format!("{base}/health");
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await
            {
                Ok(body) => {
                    let healthy =
                        body.get("status").and_then(|s| s.as_str()) == Some("healthy");
                    if healthy {
                        info!("{base} is accessible and healthy");
                    }
                    healthy
                }
                Err(err) => {
                    warn!("{base} returned an unreadable health payload: {err}");
                    false
                }
            },
            Ok(resp) => {
                warn!("{base} responded with status {}", resp.status());
                false
            }
            Err(err) => {
                warn!("{base} is not accessible: {err}");
                false
            }
        }
    }

    /// Detect, verify and register the webhook URL.
    ///
    /// Zero candidates fail immediately, before the readiness sleep.
    /// Registration itself is a single attempt; its result is returned
    /// as-is.
    pub async fn auto_setup(&self, signals: &HostingSignals) -> bool {
        let candidates = signals.candidate_urls();
        if candidates.is_empty() {
            error!("no public URLs detected; cannot set up webhook automatically");
            return false;
        }
        info!("detected candidate URLs: {candidates:?}");

        let wait = self.cfg.webhook_setup_wait;
        info!("waiting {}s for the HTTP listener to come up", wait.as_secs());
        sleep(wait).await;

        let mut working: Option<String> = None;
        'candidates: for base in &candidates {
            for attempt in 1..=self.cfg.webhook_setup_retries {
                if self.probe(base).await {
                    working = Some(base.clone());
                    break 'candidates;
                }
                if attempt < self.cfg.webhook_setup_retries {
                    info!(
                        "retry {attempt}/{} for {base}",
                        self.cfg.webhook_setup_retries
                    );
                    sleep(PROBE_BACKOFF).await;
                }
            }
        }

        let Some(base) = working else {
            error!("no accessible URLs found; webhook setup failed");
            return false;
        };

        let webhook_url = format!("{base}/webhook");
        match self.messenger.register_webhook(&webhook_url).await {
            Ok(()) => {
                info!("webhook registered: {webhook_url}");
                true
            }
            Err(err) => {
                error!("failed to register webhook: {err}");
                false
            }
        }
    }

    /// Run `auto_setup` as a supervised background task. The overall timeout
    /// bounds the task; the receiver yields the final outcome.
    pub fn spawn(self, signals: HostingSignals) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        let timeout = self.cfg.webhook_setup_timeout;

        tokio::spawn(async move {
            let ok = match tokio::time::timeout(timeout, self.auto_setup(&signals)).await {
                Ok(ok) => ok,
                Err(_) => {
                    error!("webhook setup timed out after {}s", timeout.as_secs());
                    false
                }
            };
            let _ = tx.send(ok);
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::config::BotMode;
    use crate::domain::{ChatId, MessageId, MessageRef};
    use crate::messaging::types::ChatAction;
    use crate::Result;

    fn signals() -> HostingSignals {
        HostingSignals::default()
    }

    #[test]
    fn replit_pair_yields_repl_co_url() {
        let mut s = signals();
        s.repl_slug = Some("mybot".to_string());
        s.repl_owner = Some("alice".to_string());
        assert_eq!(s.candidate_urls(), vec!["https://mybot.alice.repl.co"]);
    }

    #[test]
    fn slug_without_owner_is_not_enough() {
        let mut s = signals();
        s.repl_slug = Some("mybot".to_string());
        assert!(s.candidate_urls().is_empty());
    }

    #[test]
    fn custom_domain_gets_https_prefix() {
        let mut s = signals();
        s.custom_domain = Some("bot.example.com".to_string());
        assert_eq!(s.candidate_urls(), vec!["https://bot.example.com"]);

        s.custom_domain = Some("http://bot.example.com".to_string());
        assert_eq!(s.candidate_urls(), vec!["http://bot.example.com"]);
    }

    #[test]
    fn configured_url_is_reduced_to_origin() {
        let mut s = signals();
        s.configured_url = Some("https://bot.example.com:8443/webhook".to_string());
        assert_eq!(s.candidate_urls(), vec!["https://bot.example.com:8443"]);
    }

    #[test]
    fn candidates_are_deduplicated_and_ordered() {
        let mut s = signals();
        s.repl_id = Some("abc123".to_string());
        s.custom_domain = Some("https://abc123.replit.app".to_string());
        s.configured_url = Some("https://abc123.replit.app/webhook".to_string());
        assert_eq!(s.candidate_urls(), vec!["https://abc123.replit.app"]);
    }

    struct NullMessenger;

    #[async_trait]
    impl MessagingPort for NullMessenger {
        async fn send_text(
            &self,
            chat_id: ChatId,
            _text: &str,
            _reply_to: Option<MessageId>,
        ) -> Result<MessageRef> {
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(1),
            })
        }

        async fn send_photo(
            &self,
            chat_id: ChatId,
            _image: Vec<u8>,
            _caption: Option<&str>,
            _reply_to: Option<MessageId>,
        ) -> Result<MessageRef> {
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(1),
            })
        }

        async fn edit_text(&self, _msg: MessageRef, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn delete_message(&self, _msg: MessageRef) -> Result<()> {
            Ok(())
        }

        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            Ok(())
        }

        async fn register_webhook(&self, _url: &str) -> Result<()> {
            Ok(())
        }
    }

    fn test_config() -> Config {
        Config {
            telegram_bot_token: "token".to_string(),
            gemini_api_key: "key".to_string(),
            bot_username: None,
            webhook_url: None,
            mode: BotMode::Auto,
            bind_port: 8080,
            max_history: 20,
            context_messages: 10,
            max_message_len: 4096,
            max_image_bytes: 20 * 1024 * 1024,
            rate_limit_messages: 10,
            rate_limit_window: Duration::from_secs(60),
            webhook_setup_retries: 3,
            webhook_setup_wait: Duration::from_secs(5),
            webhook_setup_timeout: Duration::from_secs(120),
            idle_sweep_interval: Duration::from_secs(3600),
            idle_ttl: Duration::from_secs(24 * 3600),
        }
    }

    #[tokio::test]
    async fn zero_candidates_fail_immediately() {
        // The readiness sleep is 5s; an immediate failure must not take it.
        let lifecycle = WebhookLifecycle::new(Arc::new(test_config()), Arc::new(NullMessenger));

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            lifecycle.auto_setup(&HostingSignals::default()),
        )
        .await
        .expect("must fail before the readiness sleep");

        assert!(!result);
    }
}
