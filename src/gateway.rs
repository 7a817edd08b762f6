//! Persistence gateway: durable recording of completed submissions.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::LedgerError;
use crate::ledger::{Ledger, SubmissionRecord, HEADER};
use crate::redact;
use crate::retry::{self, RetryPolicy};

/// Wraps a [`Ledger`] with table initialization and retry-with-backoff.
///
/// Each submission is an independent append; a failed submission does not
/// affect later ones. Retries only delay the submission that triggered them.
pub struct SubmissionGateway {
    ledger: Arc<dyn Ledger>,
    policy: RetryPolicy,
    initialized: OnceCell<()>,
}

impl SubmissionGateway {
    pub fn new(ledger: Arc<dyn Ledger>, policy: RetryPolicy) -> Self {
        Self {
            ledger,
            policy,
            initialized: OnceCell::new(),
        }
    }

    /// Makes sure the ledger table exists, creating it with [`HEADER`].
    ///
    /// Retried like any write. Called at startup, where exhaustion is fatal,
    /// and implicitly before the first append.
    pub async fn initialize(&self) -> Result<(), LedgerError> {
        self.initialized
            .get_or_try_init(|| async {
                retry::with_backoff(
                    self.policy,
                    "ledger_initialize",
                    LedgerError::is_transient,
                    || self.ledger.ensure_table(&HEADER),
                )
                .await?;
                tracing::info!(backend = self.ledger.name(), "Ledger initialized");
                Ok::<(), LedgerError>(())
            })
            .await
            .map(|_| ())
    }

    /// Appends one submission, retrying transient failures only.
    pub async fn append_submission(&self, record: &SubmissionRecord) -> Result<(), LedgerError> {
        self.initialize().await?;

        tracing::info!(
            submitter = %record.submitter,
            email = %redact::email(&record.email),
            name = %redact::name(&record.name),
            item_id = %record.item_id,
            "Saving submission"
        );

        retry::with_backoff(
            self.policy,
            "ledger_append",
            LedgerError::is_transient,
            || self.ledger.append(record),
        )
        .await?;

        tracing::info!(
            submitter = %record.submitter,
            item_id = %record.item_id,
            "Submission saved"
        );
        Ok(())
    }
}

impl std::fmt::Debug for SubmissionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionGateway")
            .field("backend", &self.ledger.name())
            .field("policy", &self.policy)
            .field("initialized", &self.initialized.initialized())
            .finish()
    }
}
