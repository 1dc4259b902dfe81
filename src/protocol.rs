use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

pub const DEFAULT_TRUSTED_ORIGINS: &[&str] = &[
    "https://app.formcrafts.com",
    "https://app.beta-formcrafts.com",
    "https://app.localhost:5173",
];

/// A field value pushed into the embedded form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Multiple(Vec<String>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

impl From<&[&str]> for FieldValue {
    fn from(values: &[&str]) -> Self {
        Self::Multiple(values.iter().map(|value| value.to_string()).collect())
    }
}

pub type FieldValues = BTreeMap<String, FieldValue>;

/// Messages posted from the host page into a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Url {
        content: String,
    },
    Values {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<FieldValues>,
    },
}

/// Messages a frame sends back to the host page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    Load,
    Page,
    Height {
        #[serde(deserialize_with = "pixels")]
        content: f64,
    },
    Background {
        content: String,
    },
    Name {
        content: String,
    },
    Success,
    Close,
}

impl InboundMessage {
    pub fn decode(data: &JsonValue) -> Result<Self, serde_json::Error> {
        Self::deserialize(data)
    }

    /// Event name used for subscriptions and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Page => "page",
            Self::Height { .. } => "height",
            Self::Background { .. } => "background",
            Self::Name { .. } => "name",
            Self::Success => "success",
            Self::Close => "close",
        }
    }
}

// Heights arrive as numbers, older form builds send them as strings.
fn pixels<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    let value = match Raw::deserialize(deserializer)? {
        Raw::Number(value) => value,
        Raw::Text(text) => text
            .trim()
            .trim_end_matches("px")
            .parse::<f64>()
            .map_err(serde::de::Error::custom)?,
    };

    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(serde::de::Error::custom(format!(
            "invalid frame height {value}"
        )))
    }
}

/// Origins permitted to send protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowList {
    origins: Vec<String>,
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_TRUSTED_ORIGINS.iter().copied())
    }
}

impl AllowList {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            origins: origins.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.origins.iter().any(|allowed| allowed == origin)
    }

    pub fn origins(&self) -> &[String] {
        &self.origins
    }
}
