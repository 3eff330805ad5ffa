//! Startup validation with field paths and user-friendly messages.

use crate::schema::{NluProviderKind, ServerConfig};
use thiserror::Error;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All errors and warnings found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

pub fn validate(config: &ServerConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_listener(config, &mut report);
    validate_tls(config, &mut report);
    validate_dialog(config, &mut report);
    validate_nlu(config, &mut report);
    validate_store(config, &mut report);
    report
}

fn validate_listener(config: &ServerConfig, report: &mut ValidationReport) {
    match config.server.port {
        None => report.error("server.port", "No server port configured"),
        Some(0) => report.error("server.port", "Port 0 is not allowed"),
        Some(port) if config.server.web_port == Some(port) => {
            report.error("server.webPort", "Web port must differ from the server port")
        }
        Some(_) => {}
    }
}

fn validate_tls(config: &ServerConfig, report: &mut ValidationReport) {
    let tls = &config.tls;
    if !tls.enabled {
        return;
    }
    for (path, file) in [("tls.cert", &tls.cert), ("tls.key", &tls.key)] {
        match file {
            None => report.error(path, "Required when TLS is enabled"),
            Some(file) if !file.is_file() => {
                report.error(path, format!("File not found: {}", file.display()))
            }
            Some(_) => {}
        }
    }
    if let Some(ca) = &tls.client_ca {
        if !ca.is_file() {
            report.error("tls.clientCa", format!("File not found: {}", ca.display()));
        }
    }
}

fn validate_dialog(config: &ServerConfig, report: &mut ValidationReport) {
    if let Some(threshold) = config.dialog.confidence_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            report.error("dialog.confidenceThreshold", "Must be between 0 and 1");
        }
    }
    if config.dialog.question_timeout_secs == Some(0) {
        report.error("dialog.questionTimeoutSecs", "Must be greater than 0");
    }
}

fn validate_nlu(config: &ServerConfig, report: &mut ValidationReport) {
    match config.nlu.provider.unwrap_or_default() {
        NluProviderKind::Wit => {
            if config.nlu.token.as_deref().map_or(true, str::is_empty) {
                report.error("nlu.token", "The wit provider requires an access token");
            }
        }
        NluProviderKind::Keyword => {
            if config.nlu.keywords.is_empty() {
                report.warn("nlu.keywords", "No keywords configured; every chat will be unmatched");
            }
        }
    }
}

fn validate_store(config: &ServerConfig, report: &mut ValidationReport) {
    match &config.store.path {
        None => report.warn("store.path", "No registration store; only built-in registrations are active"),
        Some(path) if !path.exists() => {
            report.error("store.path", format!("File not found: {}", path.display()))
        }
        Some(_) => {}
    }
}
