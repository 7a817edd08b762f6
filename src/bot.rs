//! Event dispatch.
//!
//! [`Bot::handle`] is the single entry point for inbound events. It drops
//! events from banned users, applies the per-user rate limit, serializes
//! events of the same conversation, recovers stale button presses and then
//! runs one state machine transition together with its side effects.
//! Nothing escapes `handle`: unexpected failures are logged and answered
//! with a generic reply.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as ConversationLock;

use crate::catalog::{Catalog, CatalogProvider};
use crate::error::HandlerError;
use crate::gateway::SubmissionGateway;
use crate::i18n::{Locale, Localizer};
use crate::machine::{self, Action, Context, Input, Reaction};
use crate::rate_limit::RateLimiter;
use crate::session::{ConversationId, SessionStore, Step};
use crate::transport::{Command, Event, Interaction, MessageId, MessageRef, Messenger, View};
use crate::views::Renderer;

/// Tunables of the dispatcher.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Button presses on messages older than this are treated as stale.
    pub stale_after: chrono::Duration,
    pub support_url: Option<String>,
    pub banned_users: HashSet<i64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stale_after: chrono::Duration::minutes(120),
            support_url: None,
            banned_users: HashSet::new(),
        }
    }
}

pub struct Bot {
    catalog: Arc<CatalogProvider>,
    sessions: Arc<dyn SessionStore>,
    gateway: Arc<SubmissionGateway>,
    messenger: Arc<dyn Messenger>,
    i18n: Arc<Localizer>,
    limiter: RateLimiter,
    settings: Settings,
    locks: Mutex<HashMap<ConversationId, Arc<ConversationLock<()>>>>,
}

/// The message a button press came from and its acknowledgement id.
struct Origin<'e> {
    interaction_id: &'e str,
    message: Option<MessageId>,
}

impl Bot {
    pub fn new(
        catalog: Arc<CatalogProvider>,
        sessions: Arc<dyn SessionStore>,
        gateway: Arc<SubmissionGateway>,
        messenger: Arc<dyn Messenger>,
        i18n: Arc<Localizer>,
        limiter: RateLimiter,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            sessions,
            gateway,
            messenger,
            i18n,
            limiter,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handles one inbound event to completion.
    pub async fn handle(&self, event: Event) {
        let user_id = event.sender.user_id;
        let chat_id = event.conversation;
        let operation = event.interaction.kind();

        if self.settings.banned_users.contains(&user_id) {
            tracing::debug!(user_id, %chat_id, "Ignoring event from banned user");
            return;
        }

        if !self.limiter.check(user_id) {
            self.throttle(&event).await;
            return;
        }

        let lock = self.conversation_lock(chat_id);
        let _guard = lock.lock().await;

        tracing::debug!(user_id, %chat_id, operation, "Handling event");
        if let Err(err) = self.dispatch(&event).await {
            tracing::error!(user_id, %chat_id, operation, error = %err, "Handler failed");
            self.report_failure(&event).await;
        }
    }

    /// Forgets idle per-conversation locks and expired rate-limit history.
    pub fn prune(&self) {
        self.limiter.prune();
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    fn conversation_lock(&self, id: ConversationId) -> Arc<ConversationLock<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(id).or_default())
    }

    fn sender_locale(&self, event: &Event) -> Locale {
        event
            .sender
            .language_code
            .as_deref()
            .and_then(Locale::from_language_code)
            .unwrap_or(self.i18n.default_locale())
    }

    fn renderer<'a>(
        &'a self,
        catalog: &'a Catalog,
        locale: Locale,
        now: DateTime<Utc>,
    ) -> Renderer<'a> {
        Renderer {
            i18n: &self.i18n,
            locale,
            catalog,
            now,
            support_url: self.settings.support_url.as_deref(),
        }
    }

    fn is_stale(&self, message: &MessageRef, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(message.sent_at) > self.settings.stale_after
    }

    async fn dispatch(&self, event: &Event) -> Result<(), HandlerError> {
        let chat = event.conversation;
        let now = Utc::now();
        let catalog = self.catalog.snapshot();

        let mut session = self.sessions.get(chat).await?;
        let locale = *session.locale.get_or_insert_with(|| self.sender_locale(event));
        let view = self.renderer(&catalog, locale, now);

        let (input, origin) = match &event.interaction {
            Interaction::Command(Command::Start) => (Input::Start, None),
            Interaction::Command(Command::Help) => (Input::Help, None),
            Interaction::Text(text) => (Input::Text(text.as_str()), None),
            Interaction::Button {
                interaction_id,
                data,
                message,
            } => {
                if let Some(message) = message.filter(|m| self.is_stale(m, now)) {
                    tracing::info!(
                        user_id = event.sender.user_id,
                        %chat,
                        age_minutes = now.signed_duration_since(message.sent_at).num_minutes(),
                        "Stale interaction"
                    );
                    self.recover_stale(chat, interaction_id, message.id, &view).await;
                    return Ok(());
                }
                let input = Action::parse(data)
                    .map(Input::Action)
                    .unwrap_or(Input::Unrecognized);
                let origin = Origin {
                    interaction_id,
                    message: message.map(|m| m.id),
                };
                (input, Some(origin))
            }
        };

        let submitter = event.sender.handle();
        let ctx = Context {
            catalog: &catalog,
            now,
            submitter: &submitter,
        };
        let reaction = machine::react(&session.step, input, &ctx);
        tracing::debug!(
            user_id = event.sender.user_id,
            %chat,
            step = session.step.kind().as_str(),
            input = event.interaction.kind(),
            "Transition"
        );

        if let Some(origin) = &origin {
            let toast = match &reaction {
                Reaction::Stay(notice) | Reaction::Recover(notice) => Some(view.notice(*notice)),
                _ => None,
            };
            self.acknowledge(origin.interaction_id, toast.as_deref()).await;
        }
        let target = origin.as_ref().and_then(|origin| origin.message);

        match reaction {
            Reaction::Enter(Step::Start) => {
                self.sessions.reset(chat).await?;
                self.present(chat, target, &view.catalog_root()).await?;
            }
            Reaction::Enter(step) => {
                let screen = view.step(&step);
                session.step = step;
                self.sessions.set(chat, session).await?;
                self.present(chat, target, &screen).await?;
            }
            Reaction::Reject(err) => {
                tracing::debug!(user_id = event.sender.user_id, %chat, reason = %err, "Input rejected");
                let course_id = session.step.selected_course();
                self.sessions.set(chat, session).await?;
                if let Some(course_id) = course_id {
                    self.present(chat, target, &view.rejection(&err, course_id))
                        .await?;
                }
            }
            Reaction::Persist(record) => {
                let saved = match self.gateway.append_submission(&record).await {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::error!(
                            user_id = event.sender.user_id,
                            %chat,
                            error = %err,
                            "Submission could not be saved, offering retry"
                        );
                        false
                    }
                };
                session.step = machine::settle(record, saved);
                let screen = view.step(&session.step);
                self.sessions.set(chat, session).await?;
                self.present(chat, target, &screen).await?;
            }
            Reaction::Stay(notice) => {
                self.sessions.set(chat, session.clone()).await?;
                // Button presses already got the notice as a toast.
                if origin.is_none() {
                    self.present(chat, None, &view.with_notice(notice, &session.step))
                        .await?;
                }
            }
            Reaction::Recover(notice) => {
                self.sessions.reset(chat).await?;
                self.present(chat, target, &view.with_notice(notice, &Step::Start))
                    .await?;
            }
            Reaction::Help => {
                self.sessions.set(chat, session).await?;
                self.present(chat, None, &view.help()).await?;
            }
        }
        Ok(())
    }

    /// Shows `screen`, replacing the message the button was attached to when possible.
    async fn present(
        &self,
        chat: ConversationId,
        target: Option<MessageId>,
        screen: &View,
    ) -> Result<(), HandlerError> {
        if let Some(photo) = screen.photo.as_deref() {
            if let Some(message) = target {
                if let Err(err) = self.messenger.delete(chat, message).await {
                    tracing::debug!(%chat, error = %err, "Could not remove previous message");
                }
            }
            if let Err(err) = self.messenger.send_photo(chat, photo, None).await {
                tracing::warn!(%chat, photo, error = %err, "Failed to send payment QR code");
            }
            let text = View {
                photo: None,
                ..screen.clone()
            };
            self.messenger.send(chat, &text).await?;
            return Ok(());
        }

        match target {
            Some(message) => {
                if let Err(err) = self.messenger.edit(chat, message, screen).await {
                    tracing::debug!(%chat, error = %err, "Edit failed, sending a new message");
                    self.messenger.send(chat, screen).await?;
                }
            }
            None => {
                self.messenger.send(chat, screen).await?;
            }
        }
        Ok(())
    }

    async fn acknowledge(&self, interaction_id: &str, toast: Option<&str>) {
        if let Err(err) = self.messenger.answer(interaction_id, toast).await {
            tracing::warn!(interaction_id, error = %err, "Failed to acknowledge interaction");
        }
    }

    /// Returns a stale conversation to the catalog root. Every step is
    /// best-effort and failures are only logged.
    async fn recover_stale(
        &self,
        chat: ConversationId,
        interaction_id: &str,
        message: MessageId,
        view: &Renderer<'_>,
    ) {
        let expired = view.expired();
        self.acknowledge(interaction_id, Some(&expired)).await;

        if let Err(err) = self.messenger.delete(chat, message).await {
            tracing::debug!(%chat, error = %err, "Could not remove stale message");
        }

        if let Err(err) = self.sessions.reset(chat).await {
            tracing::warn!(%chat, error = %err, "Could not reset session during recovery");
        }

        let mut root = view.catalog_root();
        root.text = format!("{expired}\n\n{}", root.text);
        if let Err(err) = self.messenger.send(chat, &root).await {
            tracing::warn!(%chat, error = %err, "Could not render catalog during recovery");
            if let Err(err) = self.messenger.send(chat, &View::text(expired)).await {
                tracing::error!(%chat, error = %err, "Recovery could not reach the user");
            }
        }
    }

    /// Throttled events change nothing; the user only gets a notice.
    async fn throttle(&self, event: &Event) {
        let notice = self.i18n.t(self.sender_locale(event), "errors.rateLimited");
        let result = match &event.interaction {
            Interaction::Button { interaction_id, .. } => {
                self.messenger.answer(interaction_id, Some(&notice)).await
            }
            _ => self
                .messenger
                .send(event.conversation, &View::text(notice))
                .await
                .map(|_| ()),
        };
        if let Err(err) = result {
            tracing::debug!(user_id = event.sender.user_id, error = %err, "Could not deliver throttling notice");
        }
    }

    async fn report_failure(&self, event: &Event) {
        let catalog = self.catalog.snapshot();
        let view = self.renderer(&catalog, self.sender_locale(event), Utc::now());
        if let Interaction::Button { interaction_id, .. } = &event.interaction {
            // May already be answered; the platform then just refuses.
            self.acknowledge(interaction_id, None).await;
        }
        if let Err(err) = self.messenger.send(event.conversation, &view.failure()).await {
            tracing::error!(
                user_id = event.sender.user_id,
                chat_id = %event.conversation,
                error = %err,
                "Could not deliver failure notice"
            );
        }
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("sessions", &self.sessions)
            .field("gateway", &self.gateway)
            .field("limiter", &self.limiter)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
