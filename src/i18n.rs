//! Translation lookup.
//!
//! Translations are nested JSON objects addressed by dotted keys
//! (`validation.email.tooShort`). Strings may contain `{placeholder}`s.
//! A key missing in the requested locale falls back to the default locale,
//! and finally to the bracketed key itself.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LocalizationError;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is a valid regex"));

const BUNDLED_EN: &str = include_str!("../locales/en.json");
const BUNDLED_UA: &str = include_str!("../locales/ua.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Ua,
}

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::En, Locale::Ua];

    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ua => "ua",
        }
    }

    /// Maps a platform language code (IETF tag) onto a supported locale.
    pub fn from_language_code(code: &str) -> Option<Self> {
        let primary = code.split(['-', '_']).next().unwrap_or(code);
        match primary.to_ascii_lowercase().as_str() {
            "en" => Some(Locale::En),
            "uk" | "ua" => Some(Locale::Ua),
            _ => None,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locale::ALL
            .into_iter()
            .find(|locale| locale.code() == s)
            .ok_or_else(|| format!("unsupported locale '{s}'"))
    }
}

#[derive(Debug, Clone)]
pub struct Localizer {
    translations: HashMap<Locale, Value>,
    default: Locale,
}

impl Localizer {
    /// Translations compiled into the binary.
    pub fn bundled(default: Locale) -> Result<Self, LocalizationError> {
        let mut translations = HashMap::new();
        translations.insert(Locale::En, parse(Locale::En, BUNDLED_EN)?);
        translations.insert(Locale::Ua, parse(Locale::Ua, BUNDLED_UA)?);
        Ok(Self {
            translations,
            default,
        })
    }

    /// Loads `<code>.json` for every locale from `dir`.
    ///
    /// A missing file for a non-default locale is logged and skipped; the
    /// default locale must be present.
    pub fn from_dir(dir: impl AsRef<Path>, default: Locale) -> Result<Self, LocalizationError> {
        let dir = dir.as_ref();
        let mut translations = HashMap::new();

        for locale in Locale::ALL {
            let path = dir.join(format!("{}.json", locale.code()));
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    translations.insert(locale, parse(locale, &content)?);
                }
                Err(source) if locale == default => {
                    return Err(LocalizationError::Io {
                        path: path.display().to_string(),
                        source,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        locale = %locale,
                        path = %path.display(),
                        error = %err,
                        "Translation file missing, falling back to default locale"
                    );
                }
            }
        }

        Ok(Self {
            translations,
            default,
        })
    }

    pub fn default_locale(&self) -> Locale {
        self.default
    }

    pub fn t(&self, locale: Locale, key: &str) -> String {
        self.t_with(locale, key, &[])
    }

    pub fn t_with(&self, locale: Locale, key: &str, params: &[(&str, &str)]) -> String {
        match self.lookup(locale, key) {
            Some(text) => substitute(text, params),
            None => {
                tracing::warn!(locale = %locale, key, "Translation key not found");
                format!("[{key}]")
            }
        }
    }

    fn lookup(&self, locale: Locale, key: &str) -> Option<&str> {
        self.lookup_in(locale, key).or_else(|| {
            if locale == self.default {
                None
            } else {
                self.lookup_in(self.default, key)
            }
        })
    }

    fn lookup_in(&self, locale: Locale, key: &str) -> Option<&str> {
        let mut node = self.translations.get(&locale)?;
        for part in key.split('.') {
            node = node.get(part)?;
        }
        node.as_str()
    }
}

fn parse(locale: Locale, content: &str) -> Result<Value, LocalizationError> {
    serde_json::from_str(content).map_err(|source| LocalizationError::Parse {
        locale: locale.code().to_string(),
        source,
    })
}

fn substitute(text: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return text.to_string();
    }
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            params
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| (*value).to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
