//! `lisa-config`: Lisa server configuration management.
//!
//! Provides:
//! - Typed config schema (listener, TLS, dialog, NLU, store, debug switches)
//! - YAML loading
//! - `${ENV_VAR}` substitution
//! - Default value application
//! - Startup validation (errors are fatal)
//! - Redaction for safe logging

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_raw};
pub use redact::redact;
pub use schema::{
    DebugConfig, DialogConfig, ListenConfig, LoggingConfig, NluConfig, NluProviderKind,
    ServerConfig, StoreConfig, TlsConfig, WebConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

/// Load, substitute env vars, apply defaults, and validate a config file.
///
/// Any validation error is returned as an error: configuration problems are
/// fatal at startup only.
pub async fn load_and_prepare(path: &Path) -> Result<ServerConfig> {
    let raw = load_raw(path).await?;
    prepare(raw)
}

/// Run the env/defaults/validation pipeline over an already parsed document.
pub fn prepare(raw: Value) -> Result<ServerConfig> {
    let value = resolve_env_vars(&raw).context("Failed to resolve env vars in config")?;
    let config: ServerConfig =
        serde_json::from_value(value).context("Failed to deserialize config")?;
    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    if !report.is_valid() {
        for error in &report.errors {
            tracing::error!(path = %error.path, message = %error.message, "Config error");
        }
        let joined: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
        bail!("invalid configuration: {}", joined.join("; "));
    }
    Ok(config)
}
