use crate::domain::{ChatId, ChatKind, MessageId, UserId};

/// Chat metadata carried by every inbound event.
#[derive(Clone, Debug)]
pub struct ChatMeta {
    pub id: ChatId,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub member_count: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct Sender {
    pub id: UserId,
    pub username: Option<String>,
}

/// Reply information attached to an inbound message.
#[derive(Clone, Debug)]
pub struct ReplyContext {
    /// Id of the message being replied to.
    pub message_id: MessageId,
    /// Whether the replied-to message was authored by this bot.
    pub is_reply_to_bot: bool,
    /// Text of the replied-to message, if any.
    pub preview: Option<String>,
}

/// Inbound text message, mapped from the transport's update type.
#[derive(Clone, Debug)]
pub struct InboundText {
    pub chat: ChatMeta,
    pub sender: Sender,
    pub message_id: MessageId,
    pub text: String,
    pub reply: Option<ReplyContext>,
}

/// Inbound photo with the downloaded bytes of its largest size.
#[derive(Clone, Debug)]
pub struct InboundPhoto {
    pub chat: ChatMeta,
    pub sender: Sender,
    pub message_id: MessageId,
    pub image: Vec<u8>,
    pub caption: Option<String>,
    pub reply: Option<ReplyContext>,
}

/// `/image` command invocation.
#[derive(Clone, Debug)]
pub struct ImageRequest {
    pub chat: ChatMeta,
    pub sender: Sender,
    pub message_id: MessageId,
    pub prompt: String,
}

/// Outgoing "chat action" (typing indicator, etc).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    UploadPhoto,
}

/// The bot's own platform identity, fetched once at startup.
#[derive(Clone, Debug, Default)]
pub struct BotIdentity {
    pub id: Option<UserId>,
    pub username: Option<String>,
}
