//! Typed configuration schema.
//!
//! Sections are optional in the YAML file; accessors on [`ServerConfig`]
//! resolve the effective value against the constants in `defaults`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::defaults;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Name announced to clients in the login ack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_name: Option<String>,

    /// Locale, e.g. "fr-FR".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,

    #[serde(default)]
    pub server: ListenConfig,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub dialog: DialogConfig,

    #[serde(default)]
    pub nlu: NluConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub debug: DebugConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub web: WebConfig,

    /// Catalog overrides: translation key → text.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub translations: HashMap<String, String>,
}

impl ServerConfig {
    pub fn bot_name(&self) -> &str {
        self.bot_name.as_deref().unwrap_or(defaults::DEFAULT_BOT_NAME)
    }

    pub fn lang(&self) -> &str {
        self.lang.as_deref().unwrap_or(defaults::DEFAULT_LANG)
    }

    /// Language part of the locale ("fr-FR" → "fr").
    pub fn lang_short(&self) -> &str {
        let lang = self.lang();
        lang.split(['-', '_']).next().unwrap_or(lang)
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.dialog
            .confidence_threshold
            .unwrap_or(defaults::DEFAULT_CONFIDENCE_THRESHOLD)
    }

    pub fn question_timeout(&self) -> Duration {
        Duration::from_secs(
            self.dialog
                .question_timeout_secs
                .unwrap_or(defaults::DEFAULT_QUESTION_TIMEOUT_SECS),
        )
    }

    pub fn host(&self) -> &str {
        self.server.host.as_deref().unwrap_or(defaults::DEFAULT_HOST)
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(defaults::DEFAULT_LOG_LEVEL)
    }

    pub fn web_client_name(&self) -> &str {
        self.web.client_name.as_deref().unwrap_or(defaults::DEFAULT_WEB_CLIENT_NAME)
    }

    pub fn web_zone(&self) -> &str {
        self.web.zone.as_deref().unwrap_or(defaults::DEFAULT_WEB_ZONE)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Line-protocol port. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Websocket bridge and health API port. Disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,
    /// When set, clients must present a certificate signed by this CA bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ca: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NluProviderKind {
    Wit,
    #[default]
    Keyword,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NluConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<NluProviderKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Keyword provider table: intent name → trigger phrases.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub keywords: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Registration store document (YAML or JSON by extension).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugConfig {
    /// Diagnostic mode: re-raise handler faults instead of swallowing them.
    #[serde(default)]
    pub handler_faults: bool,
    /// Log every inbound and outbound frame.
    #[serde(default)]
    pub output: bool,
    /// Dump rule pipeline input and output.
    #[serde(default)]
    pub rules: bool,
    /// Dump NLU outcomes.
    #[serde(default)]
    pub nlu: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}
