use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{Delivery, InlineKeyboard, Notifier, OutboundMessage};
use crate::config::TelegramConfig;
use crate::storage::{file_name_of, FileStorage};

const PARSE_MODE: &str = "HTML";

/// The Bot API accepts between 2 and 10 items per media group.
pub const MEDIA_GROUP_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{method} request failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} rejected with status {status}: {description}")]
    Platform {
        method: &'static str,
        status: StatusCode,
        description: String,
    },
    #[error("{method} returned an unexpected payload: {reason}")]
    MalformedResponse { method: &'static str, reason: String },
    #[error("failed to encode {method} request: {reason}")]
    Encode { method: &'static str, reason: String },
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Serialize)]
struct ReplyParameters {
    message_id: i64,
    allow_sending_without_reply: bool,
}

impl ReplyParameters {
    fn to(message_id: Option<i64>) -> Option<Self> {
        message_id.map(|message_id| Self {
            message_id,
            allow_sending_without_reply: true,
        })
    }
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_parameters: Option<ReplyParameters>,
}

#[derive(Serialize)]
struct DeleteMessageRequest {
    chat_id: i64,
    message_id: i64,
}

#[derive(Serialize)]
struct InputMediaPhoto {
    #[serde(rename = "type")]
    kind: &'static str,
    media: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<String>,
}

struct ResolvedPhoto {
    file_name: String,
    bytes: Vec<u8>,
}

impl ResolvedPhoto {
    fn part(&self, method: &'static str) -> Result<Part, NotifyError> {
        let mime = mime_guess::from_path(&self.file_name).first_or(mime_guess::mime::IMAGE_JPEG);
        Part::bytes(self.bytes.clone())
            .file_name(self.file_name.clone())
            .mime_str(mime.essence_str())
            .map_err(|err| NotifyError::Encode {
                method,
                reason: err.to_string(),
            })
    }
}

/// [`Notifier`] backed by the Telegram Bot API.
pub struct TelegramGateway {
    client: Client,
    endpoint: String,
    storage: Arc<dyn FileStorage>,
}

impl TelegramGateway {
    pub fn new(config: &TelegramConfig, storage: Arc<dyn FileStorage>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build Telegram HTTP client")?;
        let endpoint = format!(
            "{}/bot{}",
            config.api_base_url.trim_end_matches('/'),
            config.bot_token
        );
        Ok(Self {
            client,
            endpoint,
            storage,
        })
    }

    fn post(&self, method: &str) -> RequestBuilder {
        self.client.post(format!("{}/{method}", self.endpoint))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: &'static str,
        request: RequestBuilder,
    ) -> Result<T, NotifyError> {
        let response = request
            .send()
            .await
            .map_err(|source| NotifyError::Transport { method, source })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| NotifyError::Transport { method, source })?;

        let parsed: ApiResponse<T> = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(NotifyError::Platform {
                    method,
                    status,
                    description: String::from_utf8_lossy(&body).into_owned(),
                })
            }
            Err(err) => {
                return Err(NotifyError::MalformedResponse {
                    method,
                    reason: err.to_string(),
                })
            }
        };

        if !status.is_success() || !parsed.ok {
            return Err(NotifyError::Platform {
                method,
                status,
                description: parsed
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            });
        }

        parsed.result.ok_or(NotifyError::MalformedResponse {
            method,
            reason: "missing result".to_string(),
        })
    }

    async fn send_text(&self, message: &OutboundMessage) -> Result<i64, NotifyError> {
        let payload = SendMessageRequest {
            chat_id: message.chat_id,
            text: &message.text,
            parse_mode: PARSE_MODE,
            reply_markup: message.keyboard.as_ref(),
            reply_parameters: ReplyParameters::to(message.reply_to),
        };
        let sent: SentMessage = self
            .execute("sendMessage", self.post("sendMessage").json(&payload))
            .await?;
        Ok(sent.message_id)
    }

    async fn send_photo(
        &self,
        message: &OutboundMessage,
        photo: &ResolvedPhoto,
    ) -> Result<i64, NotifyError> {
        const METHOD: &str = "sendPhoto";
        let mut form = Form::new()
            .text("chat_id", message.chat_id.to_string())
            .text("caption", message.text.clone())
            .text("parse_mode", PARSE_MODE);
        if let Some(keyboard) = &message.keyboard {
            form = form.text("reply_markup", encode_json(METHOD, keyboard)?);
        }
        if let Some(reply) = ReplyParameters::to(message.reply_to) {
            form = form.text("reply_parameters", encode_json(METHOD, &reply)?);
        }
        form = form.part("photo", photo.part(METHOD)?);

        let sent: SentMessage = self
            .execute(METHOD, self.post(METHOD).multipart(form))
            .await?;
        Ok(sent.message_id)
    }

    async fn send_media_group(
        &self,
        message: &OutboundMessage,
        photos: &[ResolvedPhoto],
    ) -> Result<Vec<i64>, NotifyError> {
        const METHOD: &str = "sendMediaGroup";
        let media: Vec<InputMediaPhoto> = (0..photos.len())
            .map(|index| InputMediaPhoto {
                kind: "photo",
                media: format!("attach://photo_{index}"),
                caption: (index == 0)
                    .then(|| message.media_caption.clone())
                    .flatten(),
            })
            .collect();

        let mut form = Form::new()
            .text("chat_id", message.chat_id.to_string())
            .text("media", encode_json(METHOD, &media)?);
        for (index, photo) in photos.iter().enumerate() {
            form = form.part(format!("photo_{index}"), photo.part(METHOD)?);
        }

        let sent: Vec<SentMessage> = self
            .execute(METHOD, self.post(METHOD).multipart(form))
            .await?;
        Ok(sent.into_iter().map(|message| message.message_id).collect())
    }

    async fn resolve_photos(&self, references: &[String]) -> Vec<ResolvedPhoto> {
        let mut resolved = Vec::new();
        for reference in references {
            if resolved.len() == MEDIA_GROUP_LIMIT {
                debug!(
                    limit = MEDIA_GROUP_LIMIT,
                    "photo limit reached; remaining photos not sent"
                );
                break;
            }
            let Some(file_name) = file_name_of(reference) else {
                warn!(%reference, "skipping photo with invalid reference");
                continue;
            };
            match self.storage.read(reference).await {
                Ok(Some(bytes)) => resolved.push(ResolvedPhoto {
                    file_name: file_name.to_string(),
                    bytes,
                }),
                Ok(None) => warn!(%reference, "skipping photo missing from storage"),
                Err(err) => warn!(%reference, error = %err, "skipping unreadable photo"),
            }
        }
        resolved
    }
}

fn encode_json<T: Serialize>(method: &'static str, value: &T) -> Result<String, NotifyError> {
    serde_json::to_string(value).map_err(|err| NotifyError::Encode {
        method,
        reason: err.to_string(),
    })
}

#[async_trait]
impl Notifier for TelegramGateway {
    async fn send(&self, message: OutboundMessage) -> Delivery {
        match self.send_text(&message).await {
            Ok(message_id) => Delivery::Delivered {
                message_id,
                companion_ids: Vec::new(),
            },
            Err(err) => {
                warn!(chat_id = message.chat_id, error = %err, "telegram notification failed");
                Delivery::Undelivered
            }
        }
    }

    async fn send_with_photos(&self, message: OutboundMessage, photos: &[String]) -> Delivery {
        let resolved = self.resolve_photos(photos).await;

        match resolved.as_slice() {
            [] => self.send(message).await,
            [photo] => match self.send_photo(&message, photo).await {
                Ok(message_id) => Delivery::Delivered {
                    message_id,
                    companion_ids: Vec::new(),
                },
                Err(err) => {
                    warn!(
                        chat_id = message.chat_id,
                        error = %err,
                        "photo notification failed; falling back to text"
                    );
                    self.send(message).await
                }
            },
            group => {
                // Media groups cannot carry a keyboard, so the text follows as its own message.
                let companion_ids = match self.send_media_group(&message, group).await {
                    Ok(ids) => ids,
                    Err(err) => {
                        warn!(
                            chat_id = message.chat_id,
                            photos = group.len(),
                            error = %err,
                            "media group notification failed"
                        );
                        Vec::new()
                    }
                };
                match self.send_text(&message).await {
                    Ok(message_id) => Delivery::Delivered {
                        message_id,
                        companion_ids,
                    },
                    Err(err) => {
                        warn!(
                            chat_id = message.chat_id,
                            orphaned_media = ?companion_ids,
                            error = %err,
                            "telegram notification failed"
                        );
                        Delivery::Undelivered
                    }
                }
            }
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) {
        let payload = DeleteMessageRequest {
            chat_id,
            message_id,
        };
        let result: Result<bool, NotifyError> = self
            .execute("deleteMessage", self.post("deleteMessage").json(&payload))
            .await;
        if let Err(err) = result {
            warn!(chat_id, message_id, error = %err, "failed to delete telegram message");
        }
    }
}
