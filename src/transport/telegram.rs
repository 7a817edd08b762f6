//! Telegram Bot API client and update decoding.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    Button, ButtonAction, Command, Event, Format, Interaction, MessageId, MessageRef, Messenger,
    Sender, View,
};
use crate::error::TransportError;
use crate::session::ConversationId;

const API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Bot API client implementing [`Messenger`].
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    token: String,
    api_base: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            token: token.into(),
            api_base: API_BASE.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, TransportError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;
        unwrap_response(response.json::<ApiResponse<T>>().await?)
    }

    /// Registers the webhook URL so the platform starts pushing updates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), TransportError> {
        let mut body = json!({
            "url": url,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(secret) = secret {
            body["secret_token"] = json!(secret);
        }
        let _: bool = self.call("setWebhook", &body).await?;
        tracing::info!(url, "Webhook registered");
        Ok(())
    }
}

fn unwrap_response<T>(response: ApiResponse<T>) -> Result<T, TransportError> {
    match response {
        ApiResponse {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        ApiResponse {
            error_code,
            description,
            ..
        } => Err(TransportError::Api {
            code: error_code.unwrap_or_default(),
            description: description.unwrap_or_else(|| "empty response".to_string()),
        }),
    }
}

fn reply_markup(keyboard: &[Vec<Button>]) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| match &button.action {
                    ButtonAction::Callback(data) => {
                        json!({ "text": button.label, "callback_data": data })
                    }
                    ButtonAction::Url(url) => json!({ "text": button.label, "url": url }),
                })
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Fields shared by `sendMessage` and `editMessageText`.
fn message_body(chat: ConversationId, view: &View) -> Value {
    let mut body = json!({ "chat_id": chat.0, "text": view.text });
    if view.format == Format::Markdown {
        body["parse_mode"] = json!("Markdown");
    }
    if !view.keyboard.is_empty() {
        body["reply_markup"] = reply_markup(&view.keyboard);
    }
    if view.disable_link_preview {
        body["link_preview_options"] = json!({ "is_disabled": true });
    }
    body
}

fn is_not_modified(err: &TransportError) -> bool {
    matches!(err, TransportError::Api { description, .. } if description.contains("message is not modified"))
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send(&self, chat: ConversationId, view: &View) -> Result<MessageId, TransportError> {
        let sent: SentMessage = self.call("sendMessage", &message_body(chat, view)).await?;
        Ok(MessageId(sent.message_id))
    }

    async fn edit(
        &self,
        chat: ConversationId,
        message: MessageId,
        view: &View,
    ) -> Result<(), TransportError> {
        let mut body = message_body(chat, view);
        body["message_id"] = json!(message.0);
        match self.call::<Value>("editMessageText", &body).await {
            Ok(_) => Ok(()),
            // Re-rendering an unchanged screen is not a failure.
            Err(err) if is_not_modified(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn delete(&self, chat: ConversationId, message: MessageId) -> Result<(), TransportError> {
        let body = json!({ "chat_id": chat.0, "message_id": message.0 });
        let _: bool = self.call("deleteMessage", &body).await?;
        Ok(())
    }

    async fn answer(&self, interaction_id: &str, notice: Option<&str>) -> Result<(), TransportError> {
        let mut body = json!({ "callback_query_id": interaction_id });
        if let Some(text) = notice {
            body["text"] = json!(text);
        }
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat: ConversationId,
        photo: &str,
        caption: Option<&str>,
    ) -> Result<MessageId, TransportError> {
        let sent: SentMessage = if photo.starts_with("http://") || photo.starts_with("https://") {
            let mut body = json!({ "chat_id": chat.0, "photo": photo });
            if let Some(caption) = caption {
                body["caption"] = json!(caption);
            }
            self.call("sendPhoto", &body).await?
        } else {
            let path = Path::new(photo);
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| TransportError::Asset {
                    path: photo.to_string(),
                    source,
                })?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "photo.png".to_string());

            let mut form = Form::new()
                .text("chat_id", chat.0.to_string())
                .part("photo", Part::bytes(bytes).file_name(file_name));
            if let Some(caption) = caption {
                form = form.text("caption", caption.to_string());
            }
            let response = self
                .client
                .post(self.method_url("sendPhoto"))
                .multipart(form)
                .send()
                .await?;
            unwrap_response(response.json::<ApiResponse<SentMessage>>().await?)?
        };
        Ok(MessageId(sent.message_id))
    }
}

// Inbound update payloads. Only the fields the bot reads are modelled.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    /// Unix time; `0` for messages the platform no longer exposes.
    pub date: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

impl From<&User> for Sender {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            language_code: user.language_code.clone(),
        }
    }
}

impl Update {
    /// Converts the update into an [`Event`]; `None` for update kinds the bot ignores.
    pub fn into_event(self) -> Option<Event> {
        if let Some(query) = self.callback_query {
            // Still answered, otherwise the client keeps the button spinning.
            let data = query.data.unwrap_or_default();
            let conversation = query
                .message
                .as_ref()
                .map(|message| message.chat.id)
                .unwrap_or(query.from.id);
            let message = query.message.as_ref().map(|message| MessageRef {
                id: MessageId(message.message_id),
                sent_at: DateTime::from_timestamp(message.date, 0).unwrap_or_default(),
            });
            return Some(Event {
                conversation: ConversationId(conversation),
                sender: Sender::from(&query.from),
                interaction: Interaction::Button {
                    interaction_id: query.id,
                    data,
                    message,
                },
            });
        }

        let message = self.message?;
        let sender = Sender::from(message.from.as_ref()?);
        let text = message.text?;
        let interaction = match Command::parse(&text) {
            Some(command) => Interaction::Command(command),
            None => Interaction::Text(text),
        };
        Some(Event {
            conversation: ConversationId(message.chat.id),
            sender,
            interaction,
        })
    }
}
