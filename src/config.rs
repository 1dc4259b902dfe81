use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::protocol::AllowList;

pub const DEFAULT_FORM_BASE: &str = "https://app.formcrafts.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read embed config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse form base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("form base must be an http(s) URL with a path: {0}")]
    UnsupportedBase(String),
}

/// Origin (and optional path prefix) forms are served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormBase(Url);

impl FormBase {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw.trim())?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(ConfigError::UnsupportedBase(raw.to_string()));
        }
        Ok(Self(url))
    }

    pub fn url(&self) -> &Url {
        &self.0
    }
}

impl Default for FormBase {
    fn default() -> Self {
        Self(Url::parse(DEFAULT_FORM_BASE).expect("default form base is a valid URL"))
    }
}

impl TryFrom<String> for FormBase {
    type Error = ConfigError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<FormBase> for String {
    fn from(base: FormBase) -> Self {
        base.0.into()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    pub form_base: FormBase,
    pub trusted_origins: AllowList,
    pub open_animation_ms: u64,
    pub close_animation_ms: u64,
    /// Root font-size units kept above a frame after a page change.
    pub page_scroll_rem: f64,
    /// Root font-size units kept above an inline frame after submission.
    pub success_scroll_rem: f64,
    pub popup_width: u32,
    pub open_class: String,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            form_base: FormBase::default(),
            trusted_origins: AllowList::default(),
            open_animation_ms: 300,
            close_animation_ms: 300,
            page_scroll_rem: 2.0,
            success_scroll_rem: 1.0,
            popup_width: 500,
            open_class: String::from("fc-is-open"),
        }
    }
}

impl EmbedConfig {
    /// Read a YAML config file, falling back to defaults when `config_path`
    /// is `None` or missing. File loading serves native consumers (tests,
    /// tooling); the browser build has no filesystem and is configured
    /// through the `configure` export instead.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                Self::from_yaml_str(&contents)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn open_animation(&self) -> Duration {
        Duration::from_millis(self.open_animation_ms)
    }

    pub fn close_animation(&self) -> Duration {
        Duration::from_millis(self.close_animation_ms)
    }
}
