//! Requester configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! overrides:
//!
//! ```json
//! {
//!     "template": { "interpolate": ":([A-Za-z_]+)" },
//!     "preserve_url_tokens_in_payload": { "put": false },
//!     "cache_namespace": "leagueCache"
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use sycamore_http::Method;

use crate::error::Error;

pub const DEFAULT_CACHE_NAMESPACE: &str = "requestDataCache";
pub const DEFAULT_EVALUATE: &str = r"<%([\s\S]+?)%>";
pub const DEFAULT_INTERPOLATE: &str = r"\{([\s\S]+?)\}";
pub const DEFAULT_ESCAPE: &str = r"<%-([\s\S]+?)%>";

/// Delimiter patterns for the URL template interpreter.
///
/// Each pattern must contain exactly one capture group holding the
/// expression. `None` disables that delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    pub evaluate: Option<String>,
    pub interpolate: Option<String>,
    pub escape: Option<String>,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            evaluate: Some(DEFAULT_EVALUATE.to_string()),
            interpolate: Some(DEFAULT_INTERPOLATE.to_string()),
            escape: Some(DEFAULT_ESCAPE.to_string()),
        }
    }
}

/// Per-method switch deciding whether URL tokens stay in the payload after
/// being substituted into the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreserveUrlTokens {
    pub get: bool,
    pub put: bool,
    pub post: bool,
    pub delete: bool,
    pub patch: bool,
}

impl Default for PreserveUrlTokens {
    fn default() -> Self {
        Self {
            get: false,
            put: true,
            post: true,
            delete: false,
            patch: false,
        }
    }
}

impl PreserveUrlTokens {
    pub fn preserves(&self, method: Method) -> bool {
        match method {
            Method::GET => self.get,
            Method::PUT => self.put,
            Method::POST => self.post,
            Method::DELETE => self.delete,
            Method::PATCH => self.patch,
            Method::HEAD | Method::OPTIONS => false,
        }
    }
}

/// How call-time data combines with a descriptor's own data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMerge {
    /// Override keys win; keys only present in the descriptor data survive.
    #[default]
    Merge,
    /// Override data replaces the descriptor data wholesale.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequesterConfig {
    pub template: TemplateSettings,
    pub preserve_url_tokens_in_payload: PreserveUrlTokens,
    /// Key under which the persistent cache document is stored
    pub cache_namespace: String,
    pub data_merge: DataMerge,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            template: TemplateSettings::default(),
            preserve_url_tokens_in_payload: PreserveUrlTokens::default(),
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            data_merge: DataMerge::default(),
        }
    }
}

impl RequesterConfig {
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: RequesterConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.cache_namespace.trim().is_empty() {
            return Err(Error::Config {
                message: "cache_namespace must not be empty".to_string(),
            });
        }
        if self.template.interpolate.is_none() {
            return Err(Error::Config {
                message: "template.interpolate is required for URL tokens".to_string(),
            });
        }
        Ok(())
    }
}
