/// Built-in rule actions.
///
/// These ship with the server and are registered at startup; stored rules
/// refer to them by id.
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lisa_core::{DispatchResult, Utterance};
use lisa_dialog::DialogContext;
use regex::Regex;
use serde_json::Value;
use tracing::info;

use crate::registry::ActionRegistry;
use crate::types::{RuleAction, RuleRecord};

pub const DEFAULT_ANSWER_RULE: &str = "DefaultAnswer";
pub const DEFAULT_ANSWER_ORDER: i32 = 999;

// ---------------------------------------------------------------------------
// Default answer: deliver the result body to the caller
// ---------------------------------------------------------------------------

pub struct DefaultAnswer;

#[async_trait]
impl RuleAction for DefaultAnswer {
    fn id(&self) -> &str {
        "default_answer"
    }

    async fn after(&self, result: &mut DispatchResult, _args: &Value, context: &DialogContext) -> Result<()> {
        let Some(body) = result.body.take() else {
            return Ok(());
        };
        let speaker = match result.handler_uid {
            Some(uid) => context.for_handler(uid),
            None => context.clone(),
        };
        speaker.speak(body).await;
        Ok(())
    }
}

/// The lowest-priority rule, guaranteeing one reply per turn.
pub fn default_answer_rule() -> RuleRecord {
    RuleRecord {
        name: DEFAULT_ANSWER_RULE.to_string(),
        order: DEFAULT_ANSWER_ORDER,
        enabled: true,
        before: None,
        after: Some("default_answer".to_string()),
        end: true,
        handler: None,
        args: Value::Null,
    }
}

// ---------------------------------------------------------------------------
// Log: trace every turn
// ---------------------------------------------------------------------------

pub struct LogRule;

#[async_trait]
impl RuleAction for LogRule {
    fn id(&self) -> &str {
        "log"
    }

    async fn before(&self, utterance: &mut Utterance, _args: &Value, _context: &DialogContext) -> Result<()> {
        info!(
            from = %utterance.from,
            zone = %utterance.zone,
            intent = ?utterance.intent(),
            confidence = ?utterance.outcome.confidence,
            "Utterance"
        );
        Ok(())
    }

    async fn after(&self, result: &mut DispatchResult, _args: &Value, _context: &DialogContext) -> Result<()> {
        info!(
            from = %result.from,
            handler = ?result.handler,
            entry_point = ?result.entry_point,
            "Dispatch result"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Regex rewrite: `{"pattern", "replacement", "field": "body"|"intent"}`
// ---------------------------------------------------------------------------

pub struct RegexRewrite;

impl RegexRewrite {
    fn compile(args: &Value) -> Result<(Regex, String, String)> {
        let pattern = args
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing 'pattern'"))?;
        let regex = Regex::new(pattern).context("bad pattern")?;
        let replacement = args
            .get("replacement")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let field = args
            .get("field")
            .and_then(Value::as_str)
            .unwrap_or("body")
            .to_string();
        if field != "body" && field != "intent" {
            return Err(anyhow!("unsupported field '{field}'"));
        }
        Ok((regex, replacement, field))
    }
}

#[async_trait]
impl RuleAction for RegexRewrite {
    fn id(&self) -> &str {
        "regex_rewrite"
    }

    fn validate(&self, args: &Value) -> Result<()> {
        Self::compile(args).map(|_| ())
    }

    async fn before(&self, utterance: &mut Utterance, args: &Value, _context: &DialogContext) -> Result<()> {
        let (regex, replacement, field) = Self::compile(args)?;
        let target = match field.as_str() {
            "intent" => &mut utterance.outcome.intent,
            _ => &mut utterance.body,
        };
        if let Some(text) = target {
            let rewritten = regex.replace_all(text, replacement.as_str()).into_owned();
            *text = rewritten;
        }
        Ok(())
    }
}

/// Register every built-in action.
pub fn register_builtin_actions(actions: &mut ActionRegistry) {
    actions.register(Arc::new(DefaultAnswer));
    actions.register(Arc::new(LogRule));
    actions.register(Arc::new(RegexRewrite));
}
