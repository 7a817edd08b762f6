#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use enrollment_bot::bot::{Bot, Settings};
use enrollment_bot::catalog::{Catalog, CatalogProvider};
use enrollment_bot::error::{LedgerError, TransportError};
use enrollment_bot::gateway::SubmissionGateway;
use enrollment_bot::i18n::{Locale, Localizer};
use enrollment_bot::ledger::{Ledger, SubmissionRecord};
use enrollment_bot::rate_limit::RateLimiter;
use enrollment_bot::retry::RetryPolicy;
use enrollment_bot::session::{ConversationId, MemorySessionStore, SessionStore, Step};
use enrollment_bot::transport::{
    Command, Event, Interaction, MessageId, MessageRef, Messenger, Sender, View,
};

pub const CHAT: ConversationId = ConversationId(42);
pub const USER: i64 = 7;

pub const CATALOG: &str = r#"{
    "courses": [
        {
            "id": 1,
            "name": "Storytelling for Business",
            "short_description": "Turn facts into stories",
            "description": "Four weeks of practice.",
            "authors": [{"name": "Iryna Tkach"}],
            "price": 2400,
            "currency": "UAH",
            "start_date": "2026-11-10",
            "end_date": "2026-12-08",
            "payment": {
                "privatbank": {"kind": "link", "url": "https://pay.example/1"}
            }
        },
        {
            "id": 2,
            "name": "Public Speaking",
            "short_description": "Speak with confidence",
            "description": "Three weeks.",
            "price": 1800,
            "currency": "UAH",
            "start_date": "2026-11-17",
            "end_date": "2026-12-08",
            "payment": {
                "monobank": {"kind": "link", "url": "https://pay.example/2"}
            }
        },
        {
            "id": 3,
            "name": "Pitching",
            "short_description": "Sell your idea",
            "description": "Two weeks.",
            "price": 990.50,
            "currency": "UAH",
            "start_date": "2026-12-01",
            "end_date": "2026-12-15",
            "payment": {
                "privatbank": {"kind": "link", "url": "https://pay.example/3", "qr_code": "https://pay.example/3.png"},
                "monobank": {"kind": "requisites", "iban": "UA213223130000026007233566001", "tax_id": "3141592653", "recipient": "FOP Koval", "purpose": "Pitching course"}
            }
        }
    ]
}"#;

/// Everything the bot sent to the platform.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Sent { message: MessageId, view: View },
    Edited { message: MessageId, view: View },
    Deleted { message: MessageId },
    Answered { interaction_id: String, notice: Option<String> },
    Photo { message: MessageId, photo: String },
}

/// Messenger fake that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingMessenger {
    log: Mutex<Vec<Outbound>>,
    next_id: AtomicI64,
    last_sent: AtomicI64,
    failing_sends: AtomicUsize,
    failing_deletes: AtomicUsize,
}

impl RecordingMessenger {
    pub fn outbound(&self) -> Vec<Outbound> {
        self.log.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<Outbound> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }

    /// The most recently sent or edited text view.
    pub fn last_view(&self) -> Option<View> {
        self.log.lock().unwrap().iter().rev().find_map(|out| match out {
            Outbound::Sent { view, .. } | Outbound::Edited { view, .. } => Some(view.clone()),
            _ => None,
        })
    }

    pub fn last_message(&self) -> MessageId {
        MessageId(self.last_sent.load(Ordering::SeqCst))
    }

    pub fn fail_next_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_deletes(&self, count: usize) {
        self.failing_deletes.store(count, Ordering::SeqCst);
    }

    fn record(&self, out: Outbound) {
        self.log.lock().unwrap().push(out);
    }

    fn should_fail(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn new_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 100)
    }

    fn failure() -> TransportError {
        TransportError::Api {
            code: 500,
            description: "Internal Server Error".into(),
        }
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, _chat: ConversationId, view: &View) -> Result<MessageId, TransportError> {
        if Self::should_fail(&self.failing_sends) {
            return Err(Self::failure());
        }
        let message = self.new_id();
        self.last_sent.store(message.0, Ordering::SeqCst);
        self.record(Outbound::Sent {
            message,
            view: view.clone(),
        });
        Ok(message)
    }

    async fn edit(
        &self,
        _chat: ConversationId,
        message: MessageId,
        view: &View,
    ) -> Result<(), TransportError> {
        self.record(Outbound::Edited {
            message,
            view: view.clone(),
        });
        Ok(())
    }

    async fn delete(&self, _chat: ConversationId, message: MessageId) -> Result<(), TransportError> {
        if Self::should_fail(&self.failing_deletes) {
            return Err(Self::failure());
        }
        self.record(Outbound::Deleted { message });
        Ok(())
    }

    async fn answer(&self, interaction_id: &str, notice: Option<&str>) -> Result<(), TransportError> {
        self.record(Outbound::Answered {
            interaction_id: interaction_id.to_string(),
            notice: notice.map(str::to_string),
        });
        Ok(())
    }

    async fn send_photo(
        &self,
        _chat: ConversationId,
        photo: &str,
        _caption: Option<&str>,
    ) -> Result<MessageId, TransportError> {
        let message = self.new_id();
        self.record(Outbound::Photo {
            message,
            photo: photo.to_string(),
        });
        Ok(message)
    }
}

/// Ledger fake that replays a script of failures before succeeding.
#[derive(Default)]
pub struct ScriptedLedger {
    script: Mutex<VecDeque<LedgerError>>,
    rows: Mutex<Vec<SubmissionRecord>>,
    attempts: AtomicUsize,
    tables: AtomicUsize,
}

impl ScriptedLedger {
    /// The next `count` appends fail as unavailable.
    pub fn fail_next(&self, count: usize) {
        let mut script = self.script.lock().unwrap();
        for n in 0..count {
            script.push_back(LedgerError::Unavailable(format!("scripted outage {n}")));
        }
    }

    /// The next append is refused outright.
    pub fn reject_next(&self) {
        self.script
            .lock()
            .unwrap()
            .push_back(LedgerError::Rejected("HTTP 400: invalid range".into()));
    }

    pub fn rows(&self) -> Vec<SubmissionRecord> {
        self.rows.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn tables_created(&self) -> usize {
        self.tables.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn ensure_table(&self, _header: &[&str]) -> Result<(), LedgerError> {
        self.tables.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn append(&self, record: &SubmissionRecord) -> Result<(), LedgerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.script.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub struct Harness {
    pub bot: Arc<Bot>,
    pub messenger: Arc<RecordingMessenger>,
    pub ledger: Arc<ScriptedLedger>,
    pub sessions: Arc<MemorySessionStore>,
    pub i18n: Arc<Localizer>,
    pub catalog: Arc<CatalogProvider>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(Settings::default(), 100)
    }

    pub fn with_settings(settings: Settings, rate_limit: usize) -> Self {
        let messenger = Arc::new(RecordingMessenger::default());
        let ledger = Arc::new(ScriptedLedger::default());
        let sessions = Arc::new(MemorySessionStore::new());
        let i18n = Arc::new(Localizer::bundled(Locale::Ua).unwrap());
        let catalog = Arc::new(CatalogProvider::new(Catalog::from_json(CATALOG).unwrap()));

        let gateway = SubmissionGateway::new(
            ledger.clone(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        let bot = Bot::new(
            catalog.clone(),
            sessions.clone(),
            Arc::new(gateway),
            messenger.clone(),
            i18n.clone(),
            RateLimiter::new(rate_limit, Duration::from_secs(60)),
            settings,
        );

        Self {
            bot: Arc::new(bot),
            messenger,
            ledger,
            sessions,
            i18n,
            catalog,
        }
    }

    pub fn t(&self, key: &str) -> String {
        self.i18n.t(Locale::En, key)
    }

    pub async fn step(&self) -> Step {
        self.sessions.get(CHAT).await.unwrap().step
    }

    pub async fn command(&self, command: Command) {
        self.bot.handle(event(Interaction::Command(command))).await;
    }

    pub async fn text(&self, text: &str) {
        self.bot.handle(event(Interaction::Text(text.to_string()))).await;
    }

    /// Presses a button on the last sent message.
    pub async fn press(&self, data: &str) {
        self.press_aged(data, chrono::Duration::zero()).await;
    }

    /// Presses a button on the last sent message as if it was rendered `age` ago.
    pub async fn press_aged(&self, data: &str, age: chrono::Duration) {
        let message = MessageRef {
            id: self.messenger.last_message(),
            sent_at: Utc::now() - age,
        };
        self.bot
            .handle(event(Interaction::Button {
                interaction_id: format!("cb-{data}"),
                data: data.to_string(),
                message: Some(message),
            }))
            .await;
    }
}

pub fn sender() -> Sender {
    Sender {
        user_id: USER,
        username: Some("jsmith".into()),
        first_name: Some("John".into()),
        last_name: Some("Smith".into()),
        language_code: Some("en".into()),
    }
}

pub fn event(interaction: Interaction) -> Event {
    Event {
        conversation: CHAT,
        sender: sender(),
        interaction,
    }
}
