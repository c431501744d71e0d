//! Per-chat conversation state: bounded history, context extraction, and the
//! chat-keyed store shared by all update handlers.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    domain::{ChatId, ChatKind, MessageId, MessageRef, UserId, SYSTEM_SENDER},
    messaging::types::{ChatMeta, ReplyContext, Sender},
    model::ContextEntry,
    stats::BotStats,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Photo,
    Command,
    GeneratedImage,
}

/// One history entry. Immutable once created; ordering is insertion order.
#[derive(Clone, Debug)]
pub struct StoredMessage {
    pub sender: UserId,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    pub username: Option<String>,
    pub reply_to: Option<MessageId>,
    pub is_reply_to_bot: bool,
}

impl StoredMessage {
    /// History entry for a user-authored message.
    pub fn inbound(
        kind: MessageKind,
        chat_id: ChatId,
        sender: &Sender,
        message_id: MessageId,
        text: impl Into<String>,
        reply: Option<&ReplyContext>,
    ) -> Self {
        Self {
            sender: sender.id,
            chat_id,
            message_id,
            text: text.into(),
            kind,
            timestamp: Utc::now(),
            username: sender.username.clone(),
            reply_to: reply.map(|r| r.message_id),
            is_reply_to_bot: reply.map(|r| r.is_reply_to_bot).unwrap_or(false),
        }
    }

    /// History entry for a bot-authored reply.
    pub fn assistant(sent: MessageRef, text: impl Into<String>) -> Self {
        Self {
            sender: SYSTEM_SENDER,
            chat_id: sent.chat_id,
            message_id: sent.message_id,
            text: text.into(),
            kind: MessageKind::Text,
            timestamp: Utc::now(),
            username: Some("AI Assistant".to_string()),
            reply_to: None,
            is_reply_to_bot: false,
        }
    }
}

/// Group metadata attached to a conversation at creation time only.
#[derive(Clone, Debug)]
pub struct GroupInfo {
    pub id: ChatId,
    pub title: String,
    pub kind: ChatKind,
    pub member_count: Option<u32>,
}

/// Bounded per-chat message history plus metadata.
#[derive(Debug)]
pub struct Conversation {
    pub chat_id: ChatId,
    pub kind: ChatKind,
    messages: VecDeque<StoredMessage>,
    pub group_info: Option<GroupInfo>,
    pub created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    last_bot_message: Option<MessageId>,
}

impl Conversation {
    fn new(chat_id: ChatId, kind: ChatKind, group_info: Option<GroupInfo>) -> Self {
        let now = Utc::now();
        Self {
            chat_id,
            kind,
            messages: VecDeque::new(),
            group_info,
            created_at: now,
            last_updated: now,
            last_bot_message: None,
        }
    }

    /// Append, evicting from the front until at most `max_history` entries
    /// remain (FIFO, oldest out first).
    pub fn push(&mut self, message: StoredMessage, max_history: usize) {
        self.messages.push_back(message);
        while self.messages.len() > max_history {
            self.messages.pop_front();
        }
        self.last_updated = Utc::now();
    }

    /// Context for the model call: the trailing `max_messages` entries,
    /// keeping only text and command kinds, every line as role `user`.
    ///
    /// Recomputed on every call; nothing is cached.
    pub fn context_window(&self, max_messages: usize) -> Vec<ContextEntry> {
        let skip = self.messages.len().saturating_sub(max_messages);
        self.messages
            .iter()
            .skip(skip)
            .filter(|m| matches!(m.kind, MessageKind::Text | MessageKind::Command))
            .map(|m| ContextEntry::user(m.text.clone()))
            .collect()
    }

    /// Empty the history. The conversation and its group info survive.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.last_updated = Utc::now();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &StoredMessage> {
        self.messages.iter()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn note_bot_message(&mut self, message_id: MessageId) {
        self.last_bot_message = Some(message_id);
    }

    pub fn last_bot_message(&self) -> Option<MessageId> {
        self.last_bot_message
    }
}

/// Chat-keyed conversation map.
///
/// Constructed once at startup and injected into every handler; mutation is
/// serialized per chat through the inner `Arc<Mutex<Conversation>>` handles.
pub struct ConversationStore {
    chats: Mutex<HashMap<ChatId, Arc<Mutex<Conversation>>>>,
    stats: Arc<BotStats>,
}

impl ConversationStore {
    pub fn new(stats: Arc<BotStats>) -> Self {
        Self {
            chats: Mutex::new(HashMap::new()),
            stats,
        }
    }

    /// Idempotent lookup-or-create. The first call for a chat id constructs
    /// the conversation, attaches group info when the chat is a titled
    /// group/supergroup, and bumps the conversation/group counters exactly
    /// once.
    pub async fn get_or_create(&self, meta: &ChatMeta) -> Arc<Mutex<Conversation>> {
        let mut map = self.chats.lock().await;
        if let Some(existing) = map.get(&meta.id) {
            return existing.clone();
        }

        let group_info = match (meta.kind, &meta.title) {
            (ChatKind::Group | ChatKind::Supergroup, Some(title)) => Some(GroupInfo {
                id: meta.id,
                title: title.clone(),
                kind: meta.kind,
                member_count: meta.member_count,
            }),
            _ => None,
        };

        if let Some(info) = &group_info {
            self.stats.record_group();
            info!(
                "joined group: {} (id {}, {})",
                info.title,
                info.id.0,
                info.kind.as_str()
            );
        }
        self.stats.record_conversation();

        let convo = Arc::new(Mutex::new(Conversation::new(
            meta.id, meta.kind, group_info,
        )));
        map.insert(meta.id, convo.clone());
        convo
    }

    /// Non-creating lookup. The group suppression gate uses this so ignored
    /// messages never materialize a conversation.
    pub async fn get(&self, chat_id: ChatId) -> Option<Arc<Mutex<Conversation>>> {
        self.chats.lock().await.get(&chat_id).cloned()
    }

    /// Append to an existing conversation; no-op when the chat is unknown.
    pub async fn append(&self, chat_id: ChatId, message: StoredMessage, max_history: usize) {
        if let Some(convo) = self.get(chat_id).await {
            convo.lock().await.push(message, max_history);
        }
    }

    pub async fn context_window(&self, chat_id: ChatId, max_messages: usize) -> Vec<ContextEntry> {
        match self.get(chat_id).await {
            Some(convo) => convo.lock().await.context_window(max_messages),
            None => Vec::new(),
        }
    }

    /// Returns whether a conversation existed to clear.
    pub async fn clear(&self, chat_id: ChatId) -> bool {
        match self.get(chat_id).await {
            Some(convo) => {
                convo.lock().await.clear();
                true
            }
            None => false,
        }
    }

    pub async fn count(&self) -> usize {
        self.chats.lock().await.len()
    }

    /// Drop conversations untouched for longer than `ttl`. Conversations
    /// currently locked by a handler are in use and skipped.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        self.evict_idle_at(ttl, Utc::now()).await
    }

    pub async fn evict_idle_at(&self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut map = self.chats.lock().await;
        let before = map.len();

        map.retain(|chat_id, convo| {
            let Ok(guard) = convo.try_lock() else {
                return true;
            };
            let idle = now.signed_duration_since(guard.last_updated());
            if idle > ttl {
                debug!("evicting idle conversation {}", chat_id.0);
                false
            } else {
                true
            }
        });

        before - map.len()
    }
}
