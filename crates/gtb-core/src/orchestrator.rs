//! Response orchestration: suppression and throttle gates, history updates,
//! the model call, and chunked delivery.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::{
    config::Config,
    conversation::{Conversation, ConversationStore, MessageKind, StoredMessage},
    formatting::split_message,
    media,
    messaging::{
        port::MessagingPort,
        types::{BotIdentity, ChatAction, ChatMeta, ImageRequest, InboundPhoto, InboundText, ReplyContext},
    },
    model::ModelPort,
    rate_limit::RateLimiter,
    stats::BotStats,
    Result,
};

pub const THROTTLE_NOTICE: &str =
    "⏰ You're sending messages too quickly. Please wait a moment and try again.";

const FALLBACK_REPLY: &str =
    "I'm experiencing some technical difficulties. Please try again later.";

const ANALYSIS_FALLBACK: &str =
    "I'm having trouble analyzing this image right now. Please try again later.";

const IMAGE_USAGE: &str = "🎨 Image generation\n\n\
    Please provide a description for the image you want to generate.\n\n\
    Example: /image sunset over mountains with purple sky";

const IMAGE_FAILURE: &str = "❌ Image generation failed\n\n\
    I couldn't generate an image right now. This could be due to temporary \
    service issues or content policy restrictions. Please try again with a \
    different prompt.";

const PHOTO_REJECTED: &str = "❌ Image processing error\n\n\
    The image is too large or in an unsupported format. Please send a \
    smaller image (max 20MB) in JPG, PNG or WebP format.";

/// Words that wake the bot in group chats even without an @-mention.
const GENERIC_TRIGGERS: &[&str] = &["@bot", "bot", "ai", "assistant"];

const REPLY_PREVIEW_CHARS: usize = 50;

/// What happened to an inbound event. Explicit variants instead of
/// exceptions; transport errors are the only thing surfaced as `Err`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Responded with this many outbound chunks.
    Replied { chunks: usize },
    /// Rate limited; a throttling notice was sent, nothing else happened.
    Throttled,
    /// Group suppression: silently ignored, no state touched.
    Ignored,
    /// Validation rejected the input with a user-facing explanation.
    Rejected,
    /// The model produced nothing usable; the user saw a failure notice.
    Failed,
}

/// Check whether the bot is addressed in free text.
pub fn is_bot_mentioned(text: &str, bot_username: Option<&str>) -> bool {
    if text.is_empty() {
        return false;
    }

    let lower = text.to_lowercase();
    if let Some(username) = bot_username {
        if lower.contains(&format!("@{}", username.to_lowercase())) {
            return true;
        }
    }

    GENERIC_TRIGGERS.iter().any(|t| lower.contains(t))
}

/// Coordinates one inbound event through the gates and out to the transport.
///
/// Constructed once at startup and shared by all handlers.
pub struct ResponseOrchestrator {
    cfg: Arc<Config>,
    store: Arc<ConversationStore>,
    limiter: Mutex<RateLimiter>,
    model: Arc<dyn ModelPort>,
    messenger: Arc<dyn MessagingPort>,
    stats: Arc<BotStats>,
    identity: BotIdentity,
}

impl ResponseOrchestrator {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<ConversationStore>,
        model: Arc<dyn ModelPort>,
        messenger: Arc<dyn MessagingPort>,
        stats: Arc<BotStats>,
        identity: BotIdentity,
    ) -> Self {
        let limiter = Mutex::new(RateLimiter::new(
            cfg.rate_limit_messages,
            cfg.rate_limit_window,
        ));
        Self {
            cfg,
            store,
            limiter,
            model,
            messenger,
            stats,
            identity,
        }
    }

    /// The throttle gate. Denials leave no trace in the window.
    async fn allow(&self, user: crate::domain::UserId) -> bool {
        self.limiter.lock().await.check(user)
    }

    /// Drop rate windows whose entries have all expired (maintenance sweep).
    pub async fn purge_idle_windows(&self) {
        self.limiter.lock().await.purge_idle();
    }

    /// Group suppression rule. Private chats always pass; group-style chats
    /// pass on a mention, a trigger word, a reply to the bot, or a reply to
    /// the chat's last bot message. Runs before any store mutation.
    async fn should_respond(
        &self,
        chat: &ChatMeta,
        text: &str,
        reply: Option<&ReplyContext>,
    ) -> bool {
        if !chat.kind.is_group_like() {
            return true;
        }

        if is_bot_mentioned(text, self.identity.username.as_deref()) {
            return true;
        }

        if let Some(reply) = reply {
            if reply.is_reply_to_bot {
                return true;
            }
            // Non-creating lookup: a suppressed message must not
            // materialize a conversation.
            if let Some(convo) = self.store.get(chat.id).await {
                if convo.lock().await.last_bot_message() == Some(reply.message_id) {
                    return true;
                }
            }
        }

        false
    }

    fn context_prefix(&self, convo: &Conversation, reply: Option<&ReplyContext>) -> String {
        let mut prefix = String::new();

        if let Some(info) = &convo.group_info {
            prefix.push_str(&format!("[Group: {}] ", info.title));
        }

        if let Some(reply) = reply {
            if reply.is_reply_to_bot {
                if let Some(preview) = &reply.preview {
                    let head: String = preview.chars().take(REPLY_PREVIEW_CHARS).collect();
                    prefix.push_str(&format!("[Reply to: {head}...] "));
                }
            }
        }

        prefix
    }

    pub async fn respond_to_text(&self, ev: InboundText) -> Result<Outcome> {
        if ev.text.trim().is_empty() {
            return Ok(Outcome::Ignored);
        }
        if !self.should_respond(&ev.chat, &ev.text, ev.reply.as_ref()).await {
            return Ok(Outcome::Ignored);
        }
        if !self.allow(ev.sender.id).await {
            self.messenger
                .send_text(ev.chat.id, THROTTLE_NOTICE, Some(ev.message_id))
                .await?;
            return Ok(Outcome::Throttled);
        }

        let convo = self.store.get_or_create(&ev.chat).await;
        let (prefix, context) = {
            let mut guard = convo.lock().await;
            guard.push(
                StoredMessage::inbound(
                    MessageKind::Text,
                    ev.chat.id,
                    &ev.sender,
                    ev.message_id,
                    ev.text.clone(),
                    ev.reply.as_ref(),
                ),
                self.cfg.max_history,
            );
            (
                self.context_prefix(&guard, ev.reply.as_ref()),
                guard.context_window(self.cfg.context_messages),
            )
        };

        let _ = self
            .messenger
            .send_chat_action(ev.chat.id, ChatAction::Typing)
            .await;

        let prompt = if prefix.is_empty() {
            ev.text.clone()
        } else {
            format!("{prefix}{}", ev.text)
        };

        let reply = match self.model.generate_text(&prompt, &context).await {
            Ok(text) => text,
            Err(err) => {
                warn!("text generation failed: {err}");
                FALLBACK_REPLY.to_string()
            }
        };

        let chunks = split_message(&reply, self.cfg.max_message_len);
        let mut sent = 0usize;
        for chunk in &chunks {
            let sent_ref = self
                .messenger
                .send_text(ev.chat.id, chunk, Some(ev.message_id))
                .await?;

            let mut guard = convo.lock().await;
            guard.push(
                StoredMessage::assistant(sent_ref, chunk.clone()),
                self.cfg.max_history,
            );
            guard.note_bot_message(sent_ref.message_id);
            sent += 1;
        }

        // Once per inbound event, not per chunk.
        self.stats.record_message();
        Ok(Outcome::Replied { chunks: sent })
    }

    pub async fn respond_to_photo(&self, ev: InboundPhoto) -> Result<Outcome> {
        let caption = ev.caption.clone().unwrap_or_default();
        if !self.should_respond(&ev.chat, &caption, ev.reply.as_ref()).await {
            return Ok(Outcome::Ignored);
        }
        if !self.allow(ev.sender.id).await {
            self.messenger
                .send_text(ev.chat.id, THROTTLE_NOTICE, Some(ev.message_id))
                .await?;
            return Ok(Outcome::Throttled);
        }

        let status = self
            .messenger
            .send_text(
                ev.chat.id,
                "📸 Analyzing your image... Please wait.",
                Some(ev.message_id),
            )
            .await?;

        if let Err(err) = media::validate_image(&ev.image, self.cfg.max_image_bytes) {
            warn!("rejected photo from {}: {err}", ev.sender.id.0);
            let _ = self.messenger.edit_text(status, PHOTO_REJECTED).await;
            return Ok(Outcome::Rejected);
        }

        let analysis = match self.model.analyze_image(&ev.image, ev.caption.as_deref()).await {
            Ok(text) => text,
            Err(err) => {
                warn!("image analysis failed: {err}");
                ANALYSIS_FALLBACK.to_string()
            }
        };

        let body = format!("📸 Image analysis\n\n{analysis}");
        if body.chars().count() <= self.cfg.max_message_len {
            self.messenger.edit_text(status, &body).await?;
        } else {
            let _ = self.messenger.delete_message(status).await;
            for chunk in split_message(&body, self.cfg.max_message_len) {
                self.messenger
                    .send_text(ev.chat.id, &chunk, Some(ev.message_id))
                    .await?;
            }
        }

        self.stats.record_image_analyzed();

        let convo = self.store.get_or_create(&ev.chat).await;
        let text = match &ev.caption {
            Some(c) if !c.trim().is_empty() => format!("[Photo] {c}"),
            _ => "[Photo] Image analysis".to_string(),
        };
        convo.lock().await.push(
            StoredMessage::inbound(
                MessageKind::Photo,
                ev.chat.id,
                &ev.sender,
                ev.message_id,
                text,
                ev.reply.as_ref(),
            ),
            self.cfg.max_history,
        );

        Ok(Outcome::Replied { chunks: 1 })
    }

    pub async fn generate_image(&self, ev: ImageRequest) -> Result<Outcome> {
        if !self.allow(ev.sender.id).await {
            self.messenger
                .send_text(ev.chat.id, THROTTLE_NOTICE, Some(ev.message_id))
                .await?;
            return Ok(Outcome::Throttled);
        }

        let prompt = ev.prompt.trim().to_string();
        if prompt.is_empty() {
            self.messenger
                .send_text(ev.chat.id, IMAGE_USAGE, Some(ev.message_id))
                .await?;
            return Ok(Outcome::Rejected);
        }

        let status = self
            .messenger
            .send_text(
                ev.chat.id,
                "🎨 Generating your image... This may take a moment.",
                Some(ev.message_id),
            )
            .await?;

        let generated = match self.model.generate_image(&prompt).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("image generation failed: {err}");
                None
            }
        };

        let Some(bytes) = generated else {
            let _ = self.messenger.edit_text(status, IMAGE_FAILURE).await;
            return Ok(Outcome::Failed);
        };

        let caption = format!("🎨 Generated image\nPrompt: {prompt}");
        self.messenger
            .send_photo(ev.chat.id, bytes, Some(&caption), Some(ev.message_id))
            .await?;
        let _ = self.messenger.delete_message(status).await;

        self.stats.record_image_generated();

        let convo = self.store.get_or_create(&ev.chat).await;
        convo.lock().await.push(
            StoredMessage::inbound(
                MessageKind::GeneratedImage,
                ev.chat.id,
                &ev.sender,
                ev.message_id,
                format!("/image {prompt}"),
                None,
            ),
            self.cfg.max_history,
        );

        Ok(Outcome::Replied { chunks: 1 })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::BotMode;
    use crate::domain::{ChatId, ChatKind, MessageId, MessageRef, UserId};
    use crate::messaging::types::Sender;
    use crate::model::{ContextEntry, HealthStatus, ModelHealth, ModelLineup};
    use crate::Error;

    fn test_config() -> Config {
        Config {
            telegram_bot_token: "token".to_string(),
            gemini_api_key: "key".to_string(),
            bot_username: None,
            webhook_url: None,
            mode: BotMode::Polling,
            bind_port: 8080,
            max_history: 20,
            context_messages: 10,
            max_message_len: 80,
            max_image_bytes: 1024,
            rate_limit_messages: 10,
            rate_limit_window: Duration::from_secs(60),
            webhook_setup_retries: 3,
            webhook_setup_wait: Duration::from_secs(5),
            webhook_setup_timeout: Duration::from_secs(120),
            idle_sweep_interval: Duration::from_secs(3600),
            idle_ttl: Duration::from_secs(24 * 3600),
        }
    }

    struct StubModel {
        reply: String,
        fail: bool,
    }

    impl StubModel {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                reply: String::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ModelPort for StubModel {
        async fn generate_text(&self, _prompt: &str, _context: &[ContextEntry]) -> Result<String> {
            if self.fail {
                return Err(Error::External("boom".to_string()));
            }
            Ok(self.reply.clone())
        }

        async fn analyze_image(&self, _image: &[u8], _prompt: Option<&str>) -> Result<String> {
            if self.fail {
                return Err(Error::External("boom".to_string()));
            }
            Ok("a picture of a cat".to_string())
        }

        async fn generate_image(&self, _prompt: &str) -> Result<Option<Vec<u8>>> {
            if self.fail {
                return Err(Error::External("boom".to_string()));
            }
            Ok(Some(vec![1, 2, 3]))
        }

        async fn health_check(&self) -> ModelHealth {
            ModelHealth {
                status: HealthStatus::Healthy,
                text_generation: true,
                detail: None,
                models: ModelLineup {
                    chat: "stub".to_string(),
                    vision: "stub".to_string(),
                    image_generation: "stub".to_string(),
                },
            }
        }
    }

    #[derive(Debug, PartialEq, Eq)]
    enum Sent {
        Text(i64, String),
        Photo(i64),
        Edit(i32, String),
        Delete(i32),
    }

    #[derive(Default)]
    struct RecordingMessenger {
        sent: StdMutex<Vec<Sent>>,
        next_id: AtomicI32,
    }

    impl RecordingMessenger {
        fn alloc(&self, chat_id: ChatId) -> MessageRef {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            MessageRef {
                chat_id,
                message_id: MessageId(id),
            }
        }

        fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|s| match s {
                    Sent::Text(_, t) => Some(t.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        async fn send_text(
            &self,
            chat_id: ChatId,
            text: &str,
            _reply_to: Option<MessageId>,
        ) -> Result<MessageRef> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Text(chat_id.0, text.to_string()));
            Ok(self.alloc(chat_id))
        }

        async fn send_photo(
            &self,
            chat_id: ChatId,
            _image: Vec<u8>,
            _caption: Option<&str>,
            _reply_to: Option<MessageId>,
        ) -> Result<MessageRef> {
            self.sent.lock().unwrap().push(Sent::Photo(chat_id.0));
            Ok(self.alloc(chat_id))
        }

        async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Edit(msg.message_id.0, text.to_string()));
            Ok(())
        }

        async fn delete_message(&self, msg: MessageRef) -> Result<()> {
            self.sent.lock().unwrap().push(Sent::Delete(msg.message_id.0));
            Ok(())
        }

        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            Ok(())
        }

        async fn register_webhook(&self, _url: &str) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        orchestrator: ResponseOrchestrator,
        store: Arc<ConversationStore>,
        stats: Arc<BotStats>,
        messenger: Arc<RecordingMessenger>,
    }

    fn harness_with(cfg: Config, model: StubModel, username: Option<&str>) -> Harness {
        let cfg = Arc::new(cfg);
        let stats = Arc::new(BotStats::new());
        let store = Arc::new(ConversationStore::new(stats.clone()));
        let messenger = Arc::new(RecordingMessenger::default());

        let orchestrator = ResponseOrchestrator::new(
            cfg,
            store.clone(),
            Arc::new(model),
            messenger.clone(),
            stats.clone(),
            BotIdentity {
                id: Some(UserId(999)),
                username: username.map(|s| s.to_string()),
            },
        );

        Harness {
            orchestrator,
            store,
            stats,
            messenger,
        }
    }

    fn private_text(chat: i64, user: i64, id: i32, text: &str) -> InboundText {
        InboundText {
            chat: ChatMeta {
                id: ChatId(chat),
                kind: ChatKind::Private,
                title: None,
                member_count: None,
            },
            sender: Sender {
                id: UserId(user),
                username: Some("alice".to_string()),
            },
            message_id: MessageId(id),
            text: text.to_string(),
            reply: None,
        }
    }

    fn group_text(chat: i64, user: i64, id: i32, text: &str) -> InboundText {
        InboundText {
            chat: ChatMeta {
                id: ChatId(chat),
                kind: ChatKind::Group,
                title: Some("rustaceans".to_string()),
                member_count: None,
            },
            sender: Sender {
                id: UserId(user),
                username: Some("alice".to_string()),
            },
            message_id: MessageId(id),
            text: text.to_string(),
            reply: None,
        }
    }

    #[test]
    fn mention_detection() {
        assert!(is_bot_mentioned("hello @mybot", Some("mybot")));
        assert!(is_bot_mentioned("hello @MyBot!", Some("mybot")));
        assert!(is_bot_mentioned("hey assistant, help", None));
        assert!(!is_bot_mentioned("hello there", Some("mybot")));
        assert!(!is_bot_mentioned("", Some("mybot")));
    }

    #[tokio::test]
    async fn private_text_replies_and_records_history() {
        let h = harness_with(test_config(), StubModel::replying("hi!"), Some("mybot"));

        let outcome = h
            .orchestrator
            .respond_to_text(private_text(1, 100, 1, "hello"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Replied { chunks: 1 });

        let convo = h.store.get(ChatId(1)).await.unwrap();
        let guard = convo.lock().await;
        assert_eq!(guard.len(), 2); // user message + assistant reply
        assert_eq!(h.stats.snapshot().total_messages, 1);
        assert_eq!(h.messenger.texts(), vec!["hi!".to_string()]);
    }

    #[tokio::test]
    async fn group_without_mention_is_silently_ignored() {
        let h = harness_with(test_config(), StubModel::replying("hi!"), Some("mybot"));

        let outcome = h
            .orchestrator
            .respond_to_text(group_text(-5, 100, 1, "hello there"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Ignored);

        // No conversation was materialized and nothing was sent.
        assert_eq!(h.store.count().await, 0);
        assert!(h.messenger.texts().is_empty());
        assert_eq!(h.stats.snapshot().total_messages, 0);
    }

    #[tokio::test]
    async fn group_mention_triggers_reply() {
        let h = harness_with(test_config(), StubModel::replying("hi!"), Some("mybot"));

        let outcome = h
            .orchestrator
            .respond_to_text(group_text(-5, 100, 1, "hello @mybot"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Replied { chunks: 1 });
    }

    #[tokio::test]
    async fn reply_to_bot_triggers_reply() {
        let h = harness_with(test_config(), StubModel::replying("hi!"), Some("mybot"));

        let mut ev = group_text(-5, 100, 2, "what about this?");
        ev.reply = Some(ReplyContext {
            message_id: MessageId(1),
            is_reply_to_bot: true,
            preview: Some("earlier bot reply".to_string()),
        });

        let outcome = h.orchestrator.respond_to_text(ev).await.unwrap();
        assert_eq!(outcome, Outcome::Replied { chunks: 1 });
    }

    #[tokio::test]
    async fn reply_to_last_bot_message_triggers_reply() {
        let h = harness_with(test_config(), StubModel::replying("hi!"), Some("mybot"));

        // Seed: a mention produces a bot reply whose id becomes "last sent".
        h.orchestrator
            .respond_to_text(group_text(-5, 100, 1, "hey @mybot"))
            .await
            .unwrap();
        let convo = h.store.get(ChatId(-5)).await.unwrap();
        let last = convo.lock().await.last_bot_message().unwrap();

        let mut ev = group_text(-5, 101, 2, "following up");
        ev.reply = Some(ReplyContext {
            message_id: last,
            is_reply_to_bot: false,
            preview: None,
        });

        let outcome = h.orchestrator.respond_to_text(ev).await.unwrap();
        assert_eq!(outcome, Outcome::Replied { chunks: 1 });
    }

    #[tokio::test]
    async fn throttle_denies_without_side_effects() {
        let mut cfg = test_config();
        cfg.rate_limit_messages = 1;
        let h = harness_with(cfg, StubModel::replying("hi!"), None);

        let first = h
            .orchestrator
            .respond_to_text(private_text(1, 100, 1, "one"))
            .await
            .unwrap();
        assert_eq!(first, Outcome::Replied { chunks: 1 });

        let second = h
            .orchestrator
            .respond_to_text(private_text(1, 100, 2, "two"))
            .await
            .unwrap();
        assert_eq!(second, Outcome::Throttled);

        // The throttled message was not appended.
        let convo = h.store.get(ChatId(1)).await.unwrap();
        assert_eq!(convo.lock().await.len(), 2);
        assert_eq!(h.stats.snapshot().total_messages, 1);
        assert!(h.messenger.texts().contains(&THROTTLE_NOTICE.to_string()));
    }

    #[tokio::test]
    async fn model_failure_degrades_to_placeholder() {
        let h = harness_with(test_config(), StubModel::failing(), None);

        let outcome = h
            .orchestrator
            .respond_to_text(private_text(1, 100, 1, "hello"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Replied { chunks: 1 });
        assert_eq!(h.messenger.texts(), vec![FALLBACK_REPLY.to_string()]);
    }

    #[tokio::test]
    async fn long_replies_are_chunked_and_each_chunk_recorded() {
        let long_reply = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let h = harness_with(test_config(), StubModel::replying(&long_reply), None);

        let outcome = h
            .orchestrator
            .respond_to_text(private_text(1, 100, 1, "talk a lot"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Replied { chunks: 2 });

        let convo = h.store.get(ChatId(1)).await.unwrap();
        // inbound + one assistant entry per chunk
        assert_eq!(convo.lock().await.len(), 3);
        assert_eq!(h.stats.snapshot().total_messages, 1);
    }

    #[tokio::test]
    async fn photo_with_bad_bytes_is_rejected_without_mutation() {
        let h = harness_with(test_config(), StubModel::replying("unused"), None);

        let ev = InboundPhoto {
            chat: private_text(1, 100, 1, "").chat,
            sender: private_text(1, 100, 1, "").sender,
            message_id: MessageId(1),
            image: b"definitely not an image".to_vec(),
            caption: None,
            reply: None,
        };

        let outcome = h.orchestrator.respond_to_photo(ev).await.unwrap();
        assert_eq!(outcome, Outcome::Rejected);
        assert_eq!(h.stats.snapshot().total_images_analyzed, 0);
        assert_eq!(h.store.count().await, 0);
    }

    #[tokio::test]
    async fn photo_is_analyzed_and_tracked() {
        let h = harness_with(test_config(), StubModel::replying("unused"), None);

        let ev = InboundPhoto {
            chat: private_text(1, 100, 1, "").chat,
            sender: private_text(1, 100, 1, "").sender,
            message_id: MessageId(1),
            image: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
            caption: Some("what is this?".to_string()),
            reply: None,
        };

        let outcome = h.orchestrator.respond_to_photo(ev).await.unwrap();
        assert_eq!(outcome, Outcome::Replied { chunks: 1 });
        assert_eq!(h.stats.snapshot().total_images_analyzed, 1);

        let convo = h.store.get(ChatId(1)).await.unwrap();
        let guard = convo.lock().await;
        assert_eq!(guard.len(), 1);
        // Photo entries never reach the model context.
        assert!(guard.context_window(10).is_empty());
    }

    #[tokio::test]
    async fn empty_image_prompt_is_rejected() {
        let h = harness_with(test_config(), StubModel::replying("unused"), None);

        let ev = ImageRequest {
            chat: private_text(1, 100, 1, "").chat,
            sender: private_text(1, 100, 1, "").sender,
            message_id: MessageId(1),
            prompt: "   ".to_string(),
        };

        let outcome = h.orchestrator.generate_image(ev).await.unwrap();
        assert_eq!(outcome, Outcome::Rejected);
        assert_eq!(h.stats.snapshot().total_images_generated, 0);
        assert_eq!(h.store.count().await, 0);
    }

    #[tokio::test]
    async fn image_generation_sends_photo_and_tracks() {
        let h = harness_with(test_config(), StubModel::replying("unused"), None);

        let ev = ImageRequest {
            chat: private_text(1, 100, 1, "").chat,
            sender: private_text(1, 100, 1, "").sender,
            message_id: MessageId(1),
            prompt: "a sunset".to_string(),
        };

        let outcome = h.orchestrator.generate_image(ev).await.unwrap();
        assert_eq!(outcome, Outcome::Replied { chunks: 1 });
        assert_eq!(h.stats.snapshot().total_images_generated, 1);

        let sent = h.messenger.sent.lock().unwrap();
        assert!(sent.iter().any(|s| matches!(s, Sent::Photo(1))));
        assert!(sent.iter().any(|s| matches!(s, Sent::Delete(_))));
    }

    #[tokio::test]
    async fn failed_image_generation_edits_status() {
        let h = harness_with(test_config(), StubModel::failing(), None);

        let ev = ImageRequest {
            chat: private_text(1, 100, 1, "").chat,
            sender: private_text(1, 100, 1, "").sender,
            message_id: MessageId(1),
            prompt: "a sunset".to_string(),
        };

        let outcome = h.orchestrator.generate_image(ev).await.unwrap();
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(h.stats.snapshot().total_images_generated, 0);

        let sent = h.messenger.sent.lock().unwrap();
        assert!(sent.iter().any(|s| matches!(s, Sent::Edit(_, _))));
    }
}
