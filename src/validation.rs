//! Free-text field validation.
//!
//! Every validator is a pure function from raw user input to either the
//! normalized value or a [`ValidationError`] naming the field and the reason.
//! Nothing here touches I/O, so the rules can be tested in isolation.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

const EMAIL_MIN_LEN: usize = 5;
const EMAIL_MAX_LEN: usize = 254;
const NAME_MIN_LEN: usize = 2;
const NAME_MAX_LEN: usize = 100;
const NAME_TOKEN_MAX_LEN: usize = 50;
const POSITION_MIN_LEN: usize = 2;
const POSITION_MAX_LEN: usize = 255;
/// Run length at which a repeated character is treated as keyboard mashing.
const SPAM_RUN_LEN: usize = 5;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is a valid regex")
});

/// Misspellings of popular mail providers, mapped to the intended domain.
const DOMAIN_TYPOS: &[(&str, &str)] = &[
    ("gmai.com", "gmail.com"),
    ("gmial.com", "gmail.com"),
    ("gmail.co", "gmail.com"),
    ("gmaill.com", "gmail.com"),
    ("yaho.com", "yahoo.com"),
    ("yahoo.co", "yahoo.com"),
    ("yahooo.com", "yahoo.com"),
    ("hotmai.com", "hotmail.com"),
    ("hotmail.co", "hotmail.com"),
    ("hotmial.com", "hotmail.com"),
    ("outlook.co", "outlook.com"),
    ("outlok.com", "outlook.com"),
];

/// The free-text fields collected from an applicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Email,
    Position,
}

impl Field {
    pub fn key(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Email => "email",
            Field::Position => "position",
        }
    }
}

/// Why a value was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    TooShort,
    TooLong,
    Malformed,
    InvalidCharacters,
    TokenLength,
    Repetitive,
    NoLetters,
    /// The address looks like a misspelled provider domain.
    DidYouMean { suggestion: String },
}

impl Reason {
    pub fn key(&self) -> &'static str {
        match self {
            Reason::TooShort => "tooShort",
            Reason::TooLong => "tooLong",
            Reason::Malformed => "malformed",
            Reason::InvalidCharacters => "invalidCharacters",
            Reason::TokenLength => "tokenLength",
            Reason::Repetitive => "repetitive",
            Reason::NoLetters => "noLetters",
            Reason::DidYouMean { .. } => "didYouMean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: Field,
    pub reason: Reason,
}

impl ValidationError {
    fn new(field: Field, reason: Reason) -> Self {
        Self { field, reason }
    }

    /// Translation key of the user-facing message, e.g. `validation.email.tooShort`.
    pub fn message_key(&self) -> String {
        format!("validation.{}.{}", self.field.key(), self.reason.key())
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Reason::DidYouMean { suggestion } => {
                write!(f, "{} rejected: did you mean {suggestion}?", self.field.key())
            }
            reason => write!(f, "{} rejected: {}", self.field.key(), reason.key()),
        }
    }
}

impl std::error::Error for ValidationError {}

pub type Validated = Result<String, ValidationError>;

/// Validates an email address and returns it trimmed and lower-cased.
pub fn validate_email(raw: &str) -> Validated {
    let email = raw.trim();
    let len = email.chars().count();

    if len > EMAIL_MAX_LEN {
        return Err(ValidationError::new(Field::Email, Reason::TooLong));
    }
    if len < EMAIL_MIN_LEN {
        return Err(ValidationError::new(Field::Email, Reason::TooShort));
    }
    if !EMAIL_PATTERN.is_match(email) {
        return Err(ValidationError::new(Field::Email, Reason::Malformed));
    }

    if let Some((local, domain)) = email.split_once('@') {
        if let Some(correct) = suggest_domain(domain) {
            return Err(ValidationError::new(
                Field::Email,
                Reason::DidYouMean {
                    suggestion: format!("{local}@{correct}"),
                },
            ));
        }
    }

    Ok(email.to_lowercase())
}

fn suggest_domain(domain: &str) -> Option<&'static str> {
    let domain = domain.to_lowercase();
    DOMAIN_TYPOS
        .iter()
        .find(|(typo, _)| *typo == domain)
        .map(|(_, correct)| *correct)
}

/// Validates a person's name and returns it with every token title-cased.
pub fn validate_name(raw: &str) -> Validated {
    let name = raw.trim();
    let len = name.chars().count();

    if len < NAME_MIN_LEN {
        return Err(ValidationError::new(Field::Name, Reason::TooShort));
    }
    if len > NAME_MAX_LEN {
        return Err(ValidationError::new(Field::Name, Reason::TooLong));
    }
    if !name.chars().all(is_name_char) {
        return Err(ValidationError::new(Field::Name, Reason::InvalidCharacters));
    }

    let tokens: Vec<&str> = name.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(ValidationError::new(Field::Name, Reason::TooShort));
    }
    if tokens
        .iter()
        .any(|token| token.chars().count() > NAME_TOKEN_MAX_LEN)
    {
        return Err(ValidationError::new(Field::Name, Reason::TokenLength));
    }
    if has_repeated_run(name, SPAM_RUN_LEN) {
        return Err(ValidationError::new(Field::Name, Reason::Repetitive));
    }

    Ok(tokens
        .into_iter()
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" "))
}

/// Validates a work position. The trimmed value is kept exactly as typed.
pub fn validate_position(raw: &str) -> Validated {
    let position = raw.trim();
    let len = position.chars().count();

    if len < POSITION_MIN_LEN {
        return Err(ValidationError::new(Field::Position, Reason::TooShort));
    }
    if len > POSITION_MAX_LEN {
        return Err(ValidationError::new(Field::Position, Reason::TooLong));
    }
    if !position.chars().any(is_supported_letter) {
        return Err(ValidationError::new(Field::Position, Reason::NoLetters));
    }

    Ok(position.to_string())
}

/// Letters of the Latin (incl. accented) and Cyrillic scripts.
fn is_supported_letter(c: char) -> bool {
    if c.is_ascii_alphabetic() {
        return true;
    }
    let code = c as u32;
    let latin_extended = (0x00C0..=0x024F).contains(&code);
    let cyrillic = (0x0400..=0x04FF).contains(&code);
    (latin_extended || cyrillic) && c.is_alphabetic()
}

fn is_name_char(c: char) -> bool {
    is_supported_letter(c) || c.is_whitespace() || matches!(c, '-' | '\'' | '.' | 'ʼ' | '’')
}

fn has_repeated_run(text: &str, run: usize) -> bool {
    let mut previous = None;
    let mut count = 0;
    for c in text.chars() {
        if Some(c) == previous {
            count += 1;
        } else {
            previous = Some(c);
            count = 1;
        }
        if count >= run {
            return true;
        }
    }
    false
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
