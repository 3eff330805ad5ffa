/// Rule pipeline executor.
///
/// Callers:
/// 1. An utterance is decoded → `pipeline.before(...)` may rewrite it
/// 2. The handler produced a result → `pipeline.after(...)` delivers it
use lisa_core::{DispatchResult, Utterance};
use lisa_dialog::DialogContext;
use tracing::{debug, warn};

use crate::registry::RuleSet;

#[derive(Clone)]
pub struct RulePipeline {
    pub rules: RuleSet,
    /// Dump rule input and output at debug level.
    pub trace: bool,
}

impl RulePipeline {
    pub fn new(rules: RuleSet, trace: bool) -> Self {
        Self { rules, trace }
    }

    /// Run every enabled before-action in ascending order. Returns the
    /// names of the rules that ran.
    pub async fn before(&self, utterance: &mut Utterance, context: &DialogContext) -> Vec<String> {
        let mut ran = Vec::new();
        for rule in self.rules.active().await {
            let Some(action) = &rule.before else {
                continue;
            };
            if self.trace {
                debug!(rule = %rule.name, input = ?utterance, "Before rule input");
            }
            if let Err(e) = action.before(utterance, &rule.args, context).await {
                warn!(rule = %rule.name, action = %action.id(), error = %e, "Before rule failed");
            }
            if self.trace {
                debug!(rule = %rule.name, output = ?utterance, "Before rule output");
            }
            ran.push(rule.name);
        }
        ran
    }

    /// Run enabled after-actions in ascending order, stopping once a rule
    /// flagged `end` has run.
    pub async fn after(&self, result: &mut DispatchResult, context: &DialogContext) -> Vec<String> {
        let mut ran = Vec::new();
        for rule in self.rules.active().await {
            let Some(action) = &rule.after else {
                continue;
            };
            if self.trace {
                debug!(rule = %rule.name, input = ?result, "After rule input");
            }
            if let Err(e) = action.after(result, &rule.args, context).await {
                warn!(rule = %rule.name, action = %action.id(), error = %e, "After rule failed");
            }
            if self.trace {
                debug!(rule = %rule.name, output = ?result, "After rule output");
            }
            ran.push(rule.name.clone());
            if rule.end {
                debug!(rule = %rule.name, "Rule chain ended");
                break;
            }
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ActionRegistry;
    use crate::types::{RuleAction, RuleRecord};
    use anyhow::Result;
    use async_trait::async_trait;
    use lisa_core::Catalog;
    use lisa_dialog::{DialogEngine, DialogError, DialogSettings, HandlerResolver, ResolvedHandler};
    use lisa_gateway::SessionRegistry;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct NoHandlers;

    #[async_trait]
    impl HandlerResolver for NoHandlers {
        async fn resolve(&self, handler: &str, _entry_point: &str) -> Result<ResolvedHandler, DialogError> {
            Err(DialogError::UnknownHandler(handler.into()))
        }
    }

    /// Appends its id to a shared trace.
    struct Trace {
        id: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RuleAction for Trace {
        fn id(&self) -> &str {
            self.id
        }

        async fn before(&self, utterance: &mut Utterance, _args: &Value, _context: &DialogContext) -> Result<()> {
            self.seen.lock().unwrap().push(format!("before:{}", self.id));
            utterance.metadata.insert(self.id.into(), Value::Bool(true));
            Ok(())
        }

        async fn after(&self, _result: &mut DispatchResult, _args: &Value, _context: &DialogContext) -> Result<()> {
            self.seen.lock().unwrap().push(format!("after:{}", self.id));
            Ok(())
        }
    }

    fn context() -> DialogContext {
        let engine = DialogEngine::new(
            SessionRegistry::new(),
            Arc::new(NoHandlers),
            Arc::new(Catalog::new("en", &HashMap::new())),
            DialogSettings::default(),
        );
        engine.system_context()
    }

    fn rule(name: &str, order: i32, action: &str, end: bool) -> RuleRecord {
        RuleRecord {
            name: name.into(),
            order,
            enabled: true,
            before: Some(action.into()),
            after: Some(action.into()),
            end,
            handler: None,
            args: Value::Null,
        }
    }

    async fn pipeline(seen: &Arc<Mutex<Vec<String>>>, records: &[RuleRecord]) -> RulePipeline {
        let mut actions = ActionRegistry::new();
        for id in ["a", "b", "c"] {
            actions.register(Arc::new(Trace { id, seen: seen.clone() }));
        }
        let rules = RuleSet::new();
        rules
            .replace_all(records.iter().map(|r| actions.build(r).unwrap()).collect())
            .await;
        RulePipeline::new(rules, true)
    }

    #[tokio::test]
    async fn test_before_rules_run_in_order_and_mutate() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline(&seen, &[rule("r3", 30, "c", false), rule("r1", 10, "a", false), rule("r2", 20, "b", false)]).await;

        let mut utterance = Utterance::default();
        let ran = pipeline.before(&mut utterance, &context()).await;
        assert_eq!(ran, vec!["r1", "r2", "r3"]);
        assert_eq!(*seen.lock().unwrap(), vec!["before:a", "before:b", "before:c"]);
        assert_eq!(utterance.metadata.len(), 3);
    }

    #[tokio::test]
    async fn test_after_stops_at_first_end_rule() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline(&seen, &[rule("r1", 1, "a", false), rule("r2", 2, "b", true), rule("r3", 3, "c", true)]).await;

        let mut result = DispatchResult::default();
        let ran = pipeline.after(&mut result, &context()).await;
        assert_eq!(ran, vec!["r1", "r2"]);
        assert_eq!(*seen.lock().unwrap(), vec!["after:a", "after:b"]);
    }

    #[tokio::test]
    async fn test_disabled_rules_are_skipped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut off = rule("off", 1, "a", true);
        off.enabled = false;
        let pipeline = pipeline(&seen, &[off, rule("on", 2, "b", true)]).await;

        let ran = pipeline.after(&mut DispatchResult::default(), &context()).await;
        assert_eq!(ran, vec!["on"]);
    }
}
