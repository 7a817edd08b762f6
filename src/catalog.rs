//! Course catalog loaded from a static JSON document.
//!
//! The document is read once at startup. Any schema violation, duplicate id
//! or empty list is a [`CatalogError`], which the binary treats as fatal.
//! Display order is the order of the `courses` array.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Identifier of a catalog item, as used in `course_<id>` callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub u32);

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Payment-receiving methods offered after the applicant's data is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentChannel {
    Privatbank,
    Monobank,
}

impl PaymentChannel {
    pub const ALL: [PaymentChannel; 2] = [PaymentChannel::Privatbank, PaymentChannel::Monobank];

    pub fn code(self) -> &'static str {
        match self {
            PaymentChannel::Privatbank => "privatbank",
            PaymentChannel::Monobank => "monobank",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.code() == code)
    }
}

/// How a channel receives money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentDetails {
    /// A payment page, optionally with a scannable code pointing at it.
    Link {
        url: String,
        #[serde(default)]
        qr_code: Option<String>,
    },
    /// Only a scannable code (URL or local file path).
    QrCode { asset: String },
    /// Static bank transfer details.
    Requisites {
        iban: String,
        tax_id: String,
        recipient: String,
        purpose: String,
    },
}

impl PaymentDetails {
    /// Scannable code asset to send alongside the instructions, if any.
    pub fn qr_asset(&self) -> Option<&str> {
        match self {
            PaymentDetails::Link { qr_code, .. } => qr_code.as_deref(),
            PaymentDetails::QrCode { asset } => Some(asset),
            PaymentDetails::Requisites { .. } => None,
        }
    }
}

pub type PaymentOptions = BTreeMap<PaymentChannel, PaymentDetails>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
}

/// Time-limited price override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    /// First day on which the promotion no longer applies.
    pub end_date: NaiveDate,
    #[serde(default)]
    pub payment: Option<PaymentOptions>,
}

impl Promotion {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.end_date.and_time(NaiveTime::MIN).and_utc()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub short_description: String,
    pub description: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    pub price: Decimal,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub promotion: Option<Promotion>,
    pub payment: PaymentOptions,
}

impl Course {
    pub fn active_promotion(&self, now: DateTime<Utc>) -> Option<&Promotion> {
        self.promotion.as_ref().filter(|promo| promo.is_active(now))
    }

    pub fn effective_price(&self, now: DateTime<Utc>) -> Decimal {
        self.active_promotion(now)
            .map(|promo| promo.price)
            .unwrap_or(self.price)
    }

    /// Payment options in force at `now`; an active promotion may replace them.
    pub fn payment_options(&self, now: DateTime<Utc>) -> &PaymentOptions {
        self.active_promotion(now)
            .and_then(|promo| promo.payment.as_ref())
            .unwrap_or(&self.payment)
    }

    pub fn channels(&self, now: DateTime<Utc>) -> Vec<PaymentChannel> {
        self.payment_options(now).keys().copied().collect()
    }

    pub fn payment_details(
        &self,
        channel: PaymentChannel,
        now: DateTime<Utc>,
    ) -> Option<&PaymentDetails> {
        self.payment_options(now).get(&channel)
    }

    pub fn authors_line(&self) -> String {
        self.authors
            .iter()
            .map(|author| author.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    courses: Vec<Course>,
}

/// Immutable, ordered set of courses.
#[derive(Debug, Clone)]
pub struct Catalog {
    courses: Vec<Course>,
    index: HashMap<CourseId, usize>,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        Self::from_courses(document.courses)
    }

    pub fn from_courses(courses: Vec<Course>) -> Result<Self, CatalogError> {
        if courses.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut index = HashMap::with_capacity(courses.len());
        for (position, course) in courses.iter().enumerate() {
            if course.payment.is_empty() {
                return Err(CatalogError::NoPaymentChannel(course.id.0));
            }
            if index.insert(course.id, position).is_some() {
                return Err(CatalogError::DuplicateId(course.id.0));
            }
        }

        Ok(Self { courses, index })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// All courses in display order.
    pub fn all(&self) -> &[Course] {
        &self.courses
    }

    pub fn get(&self, id: CourseId) -> Option<&Course> {
        self.index.get(&id).map(|&position| &self.courses[position])
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

/// Shares the current [`Catalog`] and swaps it on an explicit reload.
#[derive(Debug)]
pub struct CatalogProvider {
    source: Option<PathBuf>,
    current: RwLock<Arc<Catalog>>,
}

impl CatalogProvider {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            source: None,
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let path = path.into();
        let catalog = Catalog::load(&path)?;
        Ok(Self {
            source: Some(path),
            current: RwLock::new(Arc::new(catalog)),
        })
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-reads the source document. On failure the previous catalog stays in place.
    pub fn reload(&self) -> Result<(), CatalogError> {
        let Some(path) = &self.source else {
            return Ok(());
        };
        let catalog = Arc::new(Catalog::load(path)?);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = catalog;
        tracing::info!(path = %path.display(), courses = guard.len(), "Catalog reloaded");
        Ok(())
    }
}
