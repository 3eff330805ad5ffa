/// Rule action registry and the live rule set.
///
/// Actions are registered once at startup. Rule records from the store
/// are turned into [`DispatchRule`]s by resolving their action ids here;
/// an unknown id is a load error, never a runtime lookup.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::types::{DispatchRule, RuleAction, RuleError, RuleRecord};

#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn RuleAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: Arc<dyn RuleAction>) {
        debug!(action = %action.id(), "Rule action registered");
        self.actions.insert(action.id().to_string(), action);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn RuleAction>> {
        self.actions.get(id).cloned()
    }

    fn lookup(&self, rule: &str, id: Option<&str>) -> Result<Option<Arc<dyn RuleAction>>, RuleError> {
        let Some(id) = id else {
            return Ok(None);
        };
        self.get(id).map(Some).ok_or_else(|| RuleError::UnknownAction {
            rule: rule.to_string(),
            action: id.to_string(),
        })
    }

    /// Resolve a stored record into a runnable rule.
    pub fn build(&self, record: &RuleRecord) -> Result<DispatchRule, RuleError> {
        let before = self.lookup(&record.name, record.before.as_deref())?;
        let after = self.lookup(&record.name, record.after.as_deref())?;
        for action in before.iter().chain(after.iter()) {
            action.validate(&record.args).map_err(|e| RuleError::InvalidArgs {
                rule: record.name.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(DispatchRule {
            name: record.name.clone(),
            order: record.order,
            enabled: record.enabled,
            before,
            after,
            end: record.end,
            handler: record.handler.clone(),
            args: record.args.clone(),
        })
    }
}

/// Thread-safe rule list kept sorted by order key.
#[derive(Default, Clone)]
pub struct RuleSet {
    rules: Arc<RwLock<Vec<DispatchRule>>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every rule (used on load and reload).
    pub async fn replace_all(&self, mut rules: Vec<DispatchRule>) {
        rules.sort_by_key(|r| r.order);
        info!(count = rules.len(), "Dispatch rules loaded");
        *self.rules.write().await = rules;
    }

    /// Insert or replace a rule by name.
    pub async fn upsert(&self, rule: DispatchRule) {
        let mut rules = self.rules.write().await;
        rules.retain(|r| r.name != rule.name);
        rules.push(rule);
        rules.sort_by_key(|r| r.order);
    }

    pub async fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut rules = self.rules.write().await;
        match rules.iter_mut().find(|r| r.name == name) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Enable or disable every rule owned by `handler`. Returns the count.
    pub async fn set_enabled_for_handler(&self, handler: &str, enabled: bool) -> usize {
        let mut rules = self.rules.write().await;
        let mut changed = 0;
        for rule in rules.iter_mut().filter(|r| r.handler.as_deref() == Some(handler)) {
            rule.enabled = enabled;
            changed += 1;
        }
        changed
    }

    /// Enabled rules in order, cloned so the lock is not held while they run.
    pub async fn active(&self) -> Vec<DispatchRule> {
        let rules = self.rules.read().await;
        rules.iter().filter(|r| r.enabled).cloned().collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.rules.read().await.iter().any(|r| r.name == name)
    }

    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{LogRule, RegexRewrite};
    use serde_json::json;

    fn actions() -> ActionRegistry {
        let mut actions = ActionRegistry::new();
        actions.register(Arc::new(LogRule));
        actions.register(Arc::new(RegexRewrite));
        actions
    }

    fn record(name: &str, order: i32) -> RuleRecord {
        RuleRecord {
            name: name.into(),
            order,
            enabled: true,
            before: Some("log".into()),
            after: None,
            end: false,
            handler: None,
            args: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let mut rec = record("r", 1);
        rec.after = Some("rm_rf".into());
        let err = actions().build(&rec).unwrap_err();
        assert!(matches!(err, RuleError::UnknownAction { ref action, .. } if action == "rm_rf"));
    }

    #[test]
    fn test_invalid_args_are_rejected() {
        let mut rec = record("r", 1);
        rec.before = Some("regex_rewrite".into());
        rec.args = json!({ "pattern": "(" , "replacement": "" });
        assert!(matches!(actions().build(&rec), Err(RuleError::InvalidArgs { .. })));
    }

    #[tokio::test]
    async fn test_rules_sorted_and_filtered() {
        let actions = actions();
        let set = RuleSet::new();
        let mut owned = record("owned", 5);
        owned.handler = Some("Weather".into());
        set.replace_all(vec![
            actions.build(&record("late", 50)).unwrap(),
            actions.build(&record("early", -1)).unwrap(),
            actions.build(&owned).unwrap(),
        ])
        .await;

        let names: Vec<_> = set.active().await.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["early", "owned", "late"]);

        assert_eq!(set.set_enabled_for_handler("Weather", false).await, 1);
        assert!(set.set_enabled("late", false).await);
        let names: Vec<_> = set.active().await.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["early"]);

        set.upsert(actions.build(&record("early", 100)).unwrap()).await;
        assert_eq!(set.len().await, 3);
        let names: Vec<_> = set.active().await.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["early"]);
    }
}
