//! Error types for the enrollment bot.
//!
//! Each external concern gets its own enum so callers can decide what is
//! fatal (startup) and what is recoverable (inside a single handler).

/// Top-level error returned by startup code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Localization error: {0}")]
    Localization(#[from] LocalizationError),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while loading the catalog document.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog document is malformed: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("Catalog contains no courses")]
    Empty,

    #[error("Duplicate course id {0} in catalog")]
    DuplicateId(u32),

    #[error("Course {0} has no payment channel configured")]
    NoPaymentChannel(u32),
}

/// Errors from the external ledger.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// The store could not be reached or asked us to back off. Worth retrying.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// The store answered but refused the request.
    #[error("Ledger rejected the request: {0}")]
    Rejected(String),

    #[error("Ledger authentication failed: {0}")]
    Auth(String),

    #[error("Ledger backend error: {0}")]
    Backend(String),
}

impl LedgerError {
    /// Whether another attempt may succeed without any change on our side.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors from the messaging platform.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Platform API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("Failed to read asset {path}: {source}")]
    Asset {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while loading translation files.
#[derive(Debug, thiserror::Error)]
pub enum LocalizationError {
    #[error("Failed to read translations from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Translations for {locale} are malformed: {source}")]
    Parse {
        locale: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that escape a single handler invocation.
///
/// These are caught at the dispatch boundary, logged and turned into a
/// generic "something went wrong" reply.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] crate::session::SessionStoreError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
