//! Messaging platform boundary.
//!
//! Inbound traffic arrives as [`Event`]s; outbound traffic goes through the
//! [`Messenger`] trait as transport-neutral [`View`]s. The Telegram Bot API
//! implementation lives in [`telegram`], the webhook endpoint in [`webhook`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::TransportError;
use crate::session::ConversationId;

pub mod telegram;
pub mod webhook;

/// Platform identifier of a rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Opaque data echoed back in a button-press event.
    Callback(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

impl Button {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

/// Text formatting of a [`View`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Plain,
    Markdown,
}

/// One screen: text plus rows of buttons.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct View {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
    pub format: Format,
    pub disable_link_preview: bool,
    /// Image (URL or local path) sent before the text, e.g. a payment QR code.
    pub photo: Option<String>,
}

impl View {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn markdown(mut self) -> Self {
        self.format = Format::Markdown;
        self
    }

    pub fn row(mut self, row: Vec<Button>) -> Self {
        self.keyboard.push(row);
        self
    }

    pub fn button(self, button: Button) -> Self {
        self.row(vec![button])
    }

    pub fn without_link_preview(mut self) -> Self {
        self.disable_link_preview = true;
        self
    }

    pub fn with_photo(mut self, photo: impl Into<String>) -> Self {
        self.photo = Some(photo.into());
        self
    }

    /// Callback data of every button, row by row. Handy for assertions.
    pub fn callbacks(&self) -> Vec<&str> {
        self.keyboard
            .iter()
            .flatten()
            .filter_map(|button| match &button.action {
                ButtonAction::Callback(data) => Some(data.as_str()),
                ButtonAction::Url(_) => None,
            })
            .collect()
    }
}

/// Outbound side of the messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, chat: ConversationId, view: &View) -> Result<MessageId, TransportError>;

    async fn edit(
        &self,
        chat: ConversationId,
        message: MessageId,
        view: &View,
    ) -> Result<(), TransportError>;

    async fn delete(&self, chat: ConversationId, message: MessageId) -> Result<(), TransportError>;

    /// Acknowledges a button press, optionally with a short toast.
    async fn answer(&self, interaction_id: &str, notice: Option<&str>) -> Result<(), TransportError>;

    async fn send_photo(
        &self,
        chat: ConversationId,
        photo: &str,
        caption: Option<&str>,
    ) -> Result<MessageId, TransportError>;
}

/// The user behind an event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sender {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

impl Sender {
    /// Handle recorded in the ledger: `@`-less username, else full name, else `Unknown`.
    pub fn handle(&self) -> String {
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            return username.to_string();
        }
        let full_name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full_name.is_empty() {
            "Unknown".to_string()
        } else {
            full_name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
}

impl Command {
    /// Parses `/start`, `/help` and their `@botname` forms.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            _ => None,
        }
    }
}

/// The message a button was attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub id: MessageId,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Command(Command),
    Button {
        interaction_id: String,
        data: String,
        message: Option<MessageRef>,
    },
    Text(String),
}

impl Interaction {
    pub fn kind(&self) -> &'static str {
        match self {
            Interaction::Command(Command::Start) => "command_start",
            Interaction::Command(Command::Help) => "command_help",
            Interaction::Button { .. } => "button",
            Interaction::Text(_) => "text",
        }
    }
}

/// One inbound user-triggered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub conversation: ConversationId,
    pub sender: Sender,
    pub interaction: Interaction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/help@CoursesBot"), Some(Command::Help));
        assert_eq!(Command::parse("/start payload"), Some(Command::Start));
        assert_eq!(Command::parse("start"), None);
        assert_eq!(Command::parse("/stop"), None);
    }

    #[test]
    fn sender_handle_prefers_username() {
        let mut sender = Sender {
            user_id: 1,
            username: Some("jsmith".into()),
            first_name: Some("John".into()),
            last_name: Some("Smith".into()),
            language_code: None,
        };
        assert_eq!(sender.handle(), "jsmith");
        sender.username = None;
        assert_eq!(sender.handle(), "John Smith");
        sender.last_name = None;
        assert_eq!(sender.handle(), "John");
        sender.first_name = None;
        assert_eq!(sender.handle(), "Unknown");
    }
}
