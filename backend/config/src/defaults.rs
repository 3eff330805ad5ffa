//! Config defaults: fills unset values so the effective config can be logged.

use crate::schema::{NluProviderKind, ServerConfig};

pub const DEFAULT_BOT_NAME: &str = "Lisa";
pub const DEFAULT_LANG: &str = "fr-FR";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_QUESTION_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_WEB_CLIENT_NAME: &str = "Lisa-Web";
pub const DEFAULT_WEB_ZONE: &str = "WebSocket";
pub const DEFAULT_WIT_URL: &str = "https://api.wit.ai";
pub const DEFAULT_WIT_API_VERSION: &str = "20240304";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: ServerConfig) -> ServerConfig {
    let config = apply_identity_defaults(config);
    let config = apply_dialog_defaults(config);
    let config = apply_nlu_defaults(config);
    apply_logging_defaults(config)
}

fn apply_identity_defaults(mut config: ServerConfig) -> ServerConfig {
    config.bot_name.get_or_insert_with(|| DEFAULT_BOT_NAME.to_string());
    config.lang.get_or_insert_with(|| DEFAULT_LANG.to_string());
    config.server.host.get_or_insert_with(|| DEFAULT_HOST.to_string());
    config
}

fn apply_dialog_defaults(mut config: ServerConfig) -> ServerConfig {
    config
        .dialog
        .confidence_threshold
        .get_or_insert(DEFAULT_CONFIDENCE_THRESHOLD);
    config
        .dialog
        .question_timeout_secs
        .get_or_insert(DEFAULT_QUESTION_TIMEOUT_SECS);
    config
}

fn apply_nlu_defaults(mut config: ServerConfig) -> ServerConfig {
    let provider = *config.nlu.provider.get_or_insert(NluProviderKind::Keyword);
    if provider == NluProviderKind::Wit {
        config.nlu.base_url.get_or_insert_with(|| DEFAULT_WIT_URL.to_string());
        config
            .nlu
            .api_version
            .get_or_insert_with(|| DEFAULT_WIT_API_VERSION.to_string());
    }
    config
}

fn apply_logging_defaults(mut config: ServerConfig) -> ServerConfig {
    config
        .logging
        .level
        .get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    if config.logging.dir.is_none() {
        config.logging.dir = Some(crate::io::config_dir().join("logs"));
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_unset_values() {
        let config = apply_all_defaults(ServerConfig::default());
        assert_eq!(config.bot_name.as_deref(), Some(DEFAULT_BOT_NAME));
        assert_eq!(config.dialog.question_timeout_secs, Some(20));
        assert_eq!(config.nlu.provider, Some(NluProviderKind::Keyword));
        assert!(config.nlu.base_url.is_none());
        assert!(config.logging.dir.is_some());
    }

    #[test]
    fn test_defaults_keep_explicit_values() {
        let mut config = ServerConfig::default();
        config.bot_name = Some("Jarvis".into());
        config.nlu.provider = Some(NluProviderKind::Wit);
        let config = apply_all_defaults(config);
        assert_eq!(config.bot_name.as_deref(), Some("Jarvis"));
        assert_eq!(config.nlu.base_url.as_deref(), Some(DEFAULT_WIT_URL));
    }
}
