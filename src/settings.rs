//! Configuration key/value store consulted by `$INFO[key]` and conditionals

use serde::Deserialize;
use std::collections::HashMap;

/// Read access to scraper settings
pub trait Settings {
    /// Raw value of a setting
    fn value(&self, key: &str) -> Option<String>;

    /// Setting interpreted as a boolean (`true`/`false`/`yes`/`no`)
    fn flag(&self, key: &str) -> Option<bool> {
        self.value(key).as_deref().and_then(parse_flag)
    }
}

/// Parse the boolean spellings used in addon files and settings
pub fn parse_flag(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("no") {
        Some(false)
    } else {
        None
    }
}

/// A setting as it appears in a JSON settings file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum SettingValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl SettingValue {
    fn into_string(self) -> String {
        match self {
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::Number(n) => n.to_string(),
            SettingValue::Text(s) => s,
        }
    }
}

/// Map-backed settings store
///
/// Deserializes from a flat JSON object whose values are strings, numbers or
/// booleans:
///
/// ```
/// use scrapekit::{ScraperSettings, Settings};
///
/// let settings: ScraperSettings = serde_json::from_str(r#"{"fanart": true, "language": "en"}"#)?;
/// assert_eq!(settings.flag("fanart"), Some(true));
/// assert_eq!(settings.value("language").as_deref(), Some("en"));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScraperSettings {
    values: HashMap<String, String>,
}

impl<'de> Deserialize<'de> for ScraperSettings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = HashMap::<String, SettingValue>::deserialize(deserializer)?;
        Ok(Self {
            values: raw
                .into_iter()
                .map(|(k, v)| (k, v.into_string()))
                .collect(),
        })
    }
}

impl ScraperSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Settings for ScraperSettings {
    fn value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl Settings for HashMap<String, String> {
    fn value(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl<T: Settings + ?Sized> Settings for &T {
    fn value(&self, key: &str) -> Option<String> {
        (**self).value(key)
    }

    fn flag(&self, key: &str) -> Option<bool> {
        (**self).flag(key)
    }
}
