//! The external append-only ledger that records completed submissions.
//!
//! Two backends implement [`Ledger`]:
//!
//! - [`SheetsLedger`] appends rows to a Google Sheets tab
//! - [`DatabaseLedger`] inserts rows into a SeaORM-managed table
//!
//! Both create their table (tab) with the fixed [`HEADER`] when it is missing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::catalog::CourseId;
use crate::error::LedgerError;
use crate::session::Applicant;

mod database;
mod sheets;

pub use database::DatabaseLedger;
pub use sheets::{ServiceAccount, SheetsLedger};

/// Column titles of the ledger table, in order.
pub const HEADER: [&str; 7] = [
    "SubmittedAt",
    "SubmitterHandle",
    "Email",
    "Name",
    "Position",
    "ItemId",
    "ItemName",
];

/// One completed submission. Rows are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submitted_at: DateTime<Utc>,
    pub submitter: String,
    pub email: String,
    pub name: String,
    pub position: String,
    pub item_id: CourseId,
    pub item_name: String,
}

impl SubmissionRecord {
    pub fn applicant(&self) -> Applicant {
        Applicant {
            name: self.name.clone(),
            email: self.email.clone(),
            position: self.position.clone(),
        }
    }

    /// Cell values in [`HEADER`] order, with the timestamp rendered in `tz`.
    pub fn to_row(&self, tz: Tz) -> [String; 7] {
        [
            format_timestamp(self.submitted_at, tz),
            self.submitter.clone(),
            self.email.clone(),
            self.name.clone(),
            self.position.clone(),
            self.item_id.to_string(),
            self.item_name.clone(),
        ]
    }
}

/// `dd.mm.yyyy, hh:mm AM` in the given zone.
pub fn format_timestamp(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%d.%m.%Y, %I:%M %p").to_string()
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Creates the destination table with `header` unless it already exists.
    async fn ensure_table(&self, header: &[&str]) -> Result<(), LedgerError>;

    /// Appends one row. A failed call must not leave a partial row behind.
    async fn append(&self, record: &SubmissionRecord) -> Result<(), LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> SubmissionRecord {
        SubmissionRecord {
            submitted_at: Utc.with_ymd_and_hms(2025, 9, 2, 18, 5, 0).unwrap(),
            submitter: "jsmith".into(),
            email: "john@gmail.com".into(),
            name: "John Smith".into(),
            position: "QA".into(),
            item_id: CourseId(3),
            item_name: "Pitching".into(),
        }
    }

    #[test]
    fn row_follows_header_order() {
        let row = record().to_row(chrono_tz::Europe::Kiev);
        assert_eq!(row.len(), HEADER.len());
        assert_eq!(row[0], "02.09.2025, 09:05 PM");
        assert_eq!(row[1..], ["jsmith", "john@gmail.com", "John Smith", "QA", "3", "Pitching"]);
    }

    #[test]
    fn applicant_is_rebuilt_from_record() {
        let applicant = record().applicant();
        assert_eq!(applicant.name, "John Smith");
        assert_eq!(applicant.email, "john@gmail.com");
        assert_eq!(applicant.position, "QA");
    }
}
