use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

pub mod telegram;

pub use telegram::TelegramGateway;

/// A text message addressed to a chat on the messaging platform. `text` is HTML.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
    pub reply_to: Option<i64>,
    /// Caption for the first item when the photos go out as a separate media group.
    pub media_caption: Option<String>,
}

impl OutboundMessage {
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            keyboard: None,
            reply_to: None,
            media_caption: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn reply_to(mut self, message_id: Option<i64>) -> Self {
        self.reply_to = message_id;
        self
    }

    pub fn with_media_caption(mut self, caption: impl Into<String>) -> Self {
        self.media_caption = Some(caption.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn single(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            inline_keyboard: vec![vec![InlineButton {
                text: text.into(),
                callback_data: callback_data.into(),
            }]],
        }
    }
}

/// Outcome of a best-effort notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered {
        /// The message that carries the text and keyboard; later edits and deletes target it.
        message_id: i64,
        /// Messages sent alongside it, such as the items of a media group.
        companion_ids: Vec<i64>,
    },
    Undelivered,
}

impl Delivery {
    pub fn message_id(&self) -> Option<i64> {
        match self {
            Delivery::Delivered { message_id, .. } => Some(*message_id),
            Delivery::Undelivered => None,
        }
    }
}

/// Outbound side of the messaging platform.
///
/// Implementations never fail the caller: transport and platform errors are logged
/// and reported as [`Delivery::Undelivered`].
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, message: OutboundMessage) -> Delivery;

    /// Sends `message` together with the stored photos behind `photos`.
    async fn send_with_photos(&self, message: OutboundMessage, photos: &[String]) -> Delivery;

    async fn delete_message(&self, chat_id: i64, message_id: i64);
}

/// Used when no bot token is configured.
#[derive(Debug, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, message: OutboundMessage) -> Delivery {
        debug!(chat_id = message.chat_id, "notifications disabled; message dropped");
        Delivery::Undelivered
    }

    async fn send_with_photos(&self, message: OutboundMessage, photos: &[String]) -> Delivery {
        debug!(
            chat_id = message.chat_id,
            photos = photos.len(),
            "notifications disabled; message dropped"
        );
        Delivery::Undelivered
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) {
        debug!(chat_id, message_id, "notifications disabled; delete skipped");
    }
}

/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
