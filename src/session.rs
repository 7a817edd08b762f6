//! Per-conversation state.
//!
//! A [`Session`] records where a conversation is in the enrollment flow. The
//! flow position is a [`Step`] whose variants carry exactly the data that is
//! valid at that point, so a finished flow without applicant data cannot be
//! represented. Sessions live in a [`SessionStore`]; the bundled
//! [`MemorySessionStore`] keeps them in process memory only.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::catalog::{CourseId, PaymentChannel};
use crate::i18n::Locale;
use crate::ledger::SubmissionRecord;

/// Platform-supplied identifier of one conversation (chat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Validated applicant data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicant {
    pub name: String,
    pub email: String,
    pub position: String,
}

/// Position in the enrollment flow together with the data gathered so far.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    #[default]
    Start,
    CourseDetail {
        course_id: CourseId,
    },
    EnteringName {
        course_id: CourseId,
    },
    EnteringEmail {
        course_id: CourseId,
        name: String,
    },
    EnteringPosition {
        course_id: CourseId,
        name: String,
        email: String,
    },
    /// All fields were accepted but the ledger write failed. The prepared
    /// record is kept so a retry replays exactly the same submission.
    SavePending {
        record: SubmissionRecord,
    },
    SelectingBank {
        course_id: CourseId,
        applicant: Applicant,
    },
    Completed {
        course_id: CourseId,
        applicant: Applicant,
        channel: PaymentChannel,
    },
}

/// The coarse step names of the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Start,
    CourseDetail,
    EnteringName,
    EnteringEmail,
    EnteringPosition,
    SelectingBank,
    Completed,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Start => "start",
            StepKind::CourseDetail => "course_detail",
            StepKind::EnteringName => "entering_name",
            StepKind::EnteringEmail => "entering_email",
            StepKind::EnteringPosition => "entering_position",
            StepKind::SelectingBank => "selecting_bank",
            StepKind::Completed => "completed",
        }
    }
}

/// Borrowed view of the applicant fields accepted so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectedFields<'a> {
    pub name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub position: Option<&'a str>,
}

impl<'a> From<&'a Applicant> for CollectedFields<'a> {
    fn from(applicant: &'a Applicant) -> Self {
        Self {
            name: Some(&applicant.name),
            email: Some(&applicant.email),
            position: Some(&applicant.position),
        }
    }
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Start => StepKind::Start,
            Step::CourseDetail { .. } => StepKind::CourseDetail,
            Step::EnteringName { .. } => StepKind::EnteringName,
            Step::EnteringEmail { .. } => StepKind::EnteringEmail,
            // Still waiting for the position to be durably recorded.
            Step::EnteringPosition { .. } | Step::SavePending { .. } => StepKind::EnteringPosition,
            Step::SelectingBank { .. } => StepKind::SelectingBank,
            Step::Completed { .. } => StepKind::Completed,
        }
    }

    pub fn selected_course(&self) -> Option<CourseId> {
        match self {
            Step::Start => None,
            Step::CourseDetail { course_id }
            | Step::EnteringName { course_id }
            | Step::EnteringEmail { course_id, .. }
            | Step::EnteringPosition { course_id, .. }
            | Step::SelectingBank { course_id, .. }
            | Step::Completed { course_id, .. } => Some(*course_id),
            Step::SavePending { record } => Some(record.item_id),
        }
    }

    pub fn collected(&self) -> CollectedFields<'_> {
        match self {
            Step::Start | Step::CourseDetail { .. } | Step::EnteringName { .. } => {
                CollectedFields::default()
            }
            Step::EnteringEmail { name, .. } => CollectedFields {
                name: Some(name),
                ..Default::default()
            },
            Step::EnteringPosition { name, email, .. } => CollectedFields {
                name: Some(name),
                email: Some(email),
                position: None,
            },
            Step::SavePending { record } => CollectedFields {
                name: Some(&record.name),
                email: Some(&record.email),
                position: Some(&record.position),
            },
            Step::SelectingBank { applicant, .. } | Step::Completed { applicant, .. } => {
                CollectedFields::from(applicant)
            }
        }
    }

    pub fn payment_channel(&self) -> Option<PaymentChannel> {
        match self {
            Step::Completed { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub step: Step,
    /// Language remembered for this conversation, once detected.
    pub locale: Option<Locale>,
    pub created_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            step: Step::Start,
            locale: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Session backend error: {0}")]
    Backend(String),
}

/// Keyed storage of sessions.
///
/// Callers are expected to serialize access per conversation; the store
/// itself only guarantees that different conversations do not interfere.
#[async_trait]
pub trait SessionStore: Send + Sync + fmt::Debug {
    /// Returns the session for `id`, creating a default one when absent.
    async fn get(&self, id: ConversationId) -> Result<Session, SessionStoreError>;

    async fn set(&self, id: ConversationId, session: Session) -> Result<(), SessionStoreError>;

    /// Drops all state for `id`. The next [`get`](Self::get) starts over.
    async fn reset(&self, id: ConversationId) -> Result<(), SessionStoreError>;
}

/// In-process session store. Restarting the process loses every session.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<ConversationId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: ConversationId) -> Result<Session, SessionStoreError> {
        if let Some(session) = self.sessions.read().await.get(&id) {
            return Ok(session.clone());
        }
        let mut sessions = self.sessions.write().await;
        Ok(sessions.entry(id).or_default().clone())
    }

    async fn set(&self, id: ConversationId, session: Session) -> Result<(), SessionStoreError> {
        self.sessions.write().await.insert(id, session);
        Ok(())
    }

    async fn reset(&self, id: ConversationId) -> Result<(), SessionStoreError> {
        self.sessions.write().await.remove(&id);
        Ok(())
    }
}
