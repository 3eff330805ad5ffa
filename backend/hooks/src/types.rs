/// Dispatch rule model.
///
/// A rule wraps intent handling: its "before" action sees the decoded
/// utterance, its "after" action sees the dispatch result. Rules run in
/// ascending `order`; after-processing stops at the first rule with `end`.
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use lisa_core::{DispatchResult, Utterance};
use lisa_dialog::DialogContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// A trusted, pre-registered rule callback. Stored rules refer to it by id.
#[async_trait]
pub trait RuleAction: Send + Sync {
    fn id(&self) -> &str;

    /// Check a rule's arguments at load time.
    fn validate(&self, _args: &Value) -> Result<()> {
        Ok(())
    }

    async fn before(&self, _utterance: &mut Utterance, _args: &Value, _context: &DialogContext) -> Result<()> {
        Ok(())
    }

    async fn after(&self, _result: &mut DispatchResult, _args: &Value, _context: &DialogContext) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stored form
// ---------------------------------------------------------------------------

fn enabled_by_default() -> bool {
    true
}

/// Rule as found in the registration store or a handler manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    pub name: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Action id run before the handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    /// Action id run after the handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default)]
    pub end: bool,
    /// Owning handler; enabling/disabling it cascades to this rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub args: Value,
}

// ---------------------------------------------------------------------------
// Runtime form
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DispatchRule {
    pub name: String,
    pub order: i32,
    pub enabled: bool,
    pub before: Option<Arc<dyn RuleAction>>,
    pub after: Option<Arc<dyn RuleAction>>,
    pub end: bool,
    pub handler: Option<String>,
    pub args: Value,
}

impl std::fmt::Debug for DispatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchRule")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("enabled", &self.enabled)
            .field("before", &self.before.as_ref().map(|a| a.id().to_string()))
            .field("after", &self.after.as_ref().map(|a| a.id().to_string()))
            .field("end", &self.end)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule '{rule}' references unknown action '{action}'")]
    UnknownAction { rule: String, action: String },

    #[error("rule '{rule}' has invalid arguments: {message}")]
    InvalidArgs { rule: String, message: String },
}
