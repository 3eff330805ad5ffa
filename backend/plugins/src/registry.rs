/// Handler registry: live handler instances plus the merged registration
/// records (intents, rules, crons) that route work to them.
///
/// Records are layered on every rebuild: built-in defaults first, then
/// what handler manifests declare, then the registration store, then
/// runtime enable/disable toggles. A disabled handler disables every
/// record that names it.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use lisa_core::HandlerUid;
use lisa_dialog::{DialogError, Handler, HandlerResolver, ResolvedHandler};
use lisa_hooks::RuleRecord;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::manifest::HandlerManifest;
use crate::store::{CronRecord, IntentRecord, RegistrationStore, StoreDocument, StoreError};

/// Listing entry for capability queries.
#[derive(Clone)]
pub struct HandlerSummary {
    pub name: String,
    pub enabled: bool,
    pub i_can: Option<String>,
    pub handler: ResolvedHandler,
}

struct Registration {
    uid: HandlerUid,
    manifest: HandlerManifest,
    instance: Arc<dyn Handler>,
    enabled: bool,
}

#[derive(Default)]
struct RegistryInner {
    handlers: BTreeMap<String, Registration>,
    builtin: StoreDocument,
    store: StoreDocument,
    handler_toggles: HashMap<String, bool>,
    intent_toggles: HashMap<String, bool>,
    intents: BTreeMap<String, IntentRecord>,
    rules: BTreeMap<String, RuleRecord>,
    crons: BTreeMap<String, CronRecord>,
}

impl RegistryInner {
    fn layer(&mut self, intents: Vec<IntentRecord>, rules: Vec<RuleRecord>, crons: Vec<CronRecord>) {
        for intent in intents {
            self.intents.insert(intent.name.clone(), intent);
        }
        for rule in rules {
            self.rules.insert(rule.name.clone(), rule);
        }
        for cron in crons {
            self.crons.insert(cron.name.clone(), cron);
        }
    }

    fn rebuild(&mut self) {
        self.intents.clear();
        self.rules.clear();
        self.crons.clear();

        let builtin = self.builtin.clone();
        self.layer(builtin.intents, builtin.rules, builtin.crons);

        let mut declared = (Vec::new(), Vec::new(), Vec::new());
        for reg in self.handlers.values() {
            declared.0.extend(reg.manifest.intent_records());
            declared.1.extend(reg.manifest.rule_records());
            declared.2.extend(reg.manifest.cron_records());
        }
        self.layer(declared.0, declared.1, declared.2);

        let store = self.store.clone();
        self.layer(store.intents, store.rules, store.crons);

        for (name, reg) in self.handlers.iter_mut() {
            reg.enabled = store
                .handlers
                .iter()
                .find(|h| &h.name == name)
                .map_or(reg.manifest.enabled, |h| h.enabled);
            if let Some(enabled) = self.handler_toggles.get(name) {
                reg.enabled = *enabled;
            }
        }
        for (name, enabled) in &self.intent_toggles {
            if let Some(intent) = self.intents.get_mut(name) {
                intent.enabled = *enabled;
            }
        }

        let disabled: Vec<String> = self
            .handlers
            .iter()
            .filter(|(_, reg)| !reg.enabled)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &disabled {
            self.cascade(name, false);
        }
    }

    fn cascade(&mut self, handler: &str, enabled: bool) -> usize {
        let mut changed = 0;
        for intent in self.intents.values_mut().filter(|i| i.handler == handler) {
            intent.enabled = enabled;
            changed += 1;
        }
        for rule in self.rules.values_mut().filter(|r| r.handler.as_deref() == Some(handler)) {
            rule.enabled = enabled;
            changed += 1;
        }
        for cron in self.crons.values_mut().filter(|c| c.handler == handler) {
            cron.enabled = enabled;
            changed += 1;
        }
        changed
    }
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler instance under its manifest.
    pub async fn register(&self, manifest: HandlerManifest, instance: Arc<dyn Handler>) -> Result<HandlerUid> {
        manifest.validate()?;
        if manifest.name != instance.name() {
            bail!(
                "Manifest name '{}' does not match handler '{}'",
                manifest.name,
                instance.name()
            );
        }
        for (intent, decl) in &manifest.intents {
            if !instance.entry_points().contains(&decl.entry_point.as_str()) {
                bail!(
                    "Intent '{}' targets unknown entry point '{}' of handler '{}'",
                    intent,
                    decl.entry_point,
                    manifest.name
                );
            }
        }

        let mut inner = self.inner.write().await;
        if inner.handlers.contains_key(&manifest.name) {
            bail!("Handler '{}' is already registered", manifest.name);
        }
        let uid = HandlerUid::new();
        info!(handler = %manifest.name, %uid, intents = manifest.intents.len(), "Handler registered");
        inner.handlers.insert(
            manifest.name.clone(),
            Registration {
                uid,
                enabled: manifest.enabled,
                manifest,
                instance,
            },
        );
        inner.rebuild();
        Ok(uid)
    }

    /// Add a default rule, overridable by manifests and the store.
    pub async fn ensure_rule(&self, record: RuleRecord) {
        let mut inner = self.inner.write().await;
        inner.builtin.rules.retain(|r| r.name != record.name);
        inner.builtin.rules.push(record);
        inner.rebuild();
    }

    /// Re-read the store and rebuild every record.
    pub async fn reload(&self, store: &dyn RegistrationStore) -> Result<(), StoreError> {
        let doc = store.load().await?;
        let mut inner = self.inner.write().await;
        inner.store = doc;
        inner.rebuild();
        info!(
            handlers = inner.handlers.len(),
            intents = inner.intents.len(),
            rules = inner.rules.len(),
            crons = inner.crons.len(),
            "Registrations reloaded"
        );
        Ok(())
    }

    /// Enable or disable a handler and everything it owns.
    /// Returns false when no such handler is registered.
    pub async fn set_handler_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut inner = self.inner.write().await;
        let Some(reg) = inner.handlers.get_mut(name) else {
            return false;
        };
        reg.enabled = enabled;
        inner.handler_toggles.insert(name.to_string(), enabled);
        let changed = inner.cascade(name, enabled);
        debug!(handler = %name, enabled, records = changed, "Handler toggled");
        true
    }

    pub async fn set_intent_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut inner = self.inner.write().await;
        let Some(intent) = inner.intents.get_mut(name) else {
            return false;
        };
        intent.enabled = enabled;
        inner.intent_toggles.insert(name.to_string(), enabled);
        true
    }

    pub async fn intent(&self, name: &str) -> Option<IntentRecord> {
        self.inner.read().await.intents.get(name).cloned()
    }

    pub async fn intents(&self) -> Vec<IntentRecord> {
        self.inner.read().await.intents.values().cloned().collect()
    }

    pub async fn rules(&self) -> Vec<RuleRecord> {
        self.inner.read().await.rules.values().cloned().collect()
    }

    pub async fn crons(&self) -> Vec<CronRecord> {
        self.inner.read().await.crons.values().cloned().collect()
    }

    /// Every registered handler, ordered by name.
    pub async fn handlers(&self) -> Vec<HandlerSummary> {
        let inner = self.inner.read().await;
        inner
            .handlers
            .values()
            .map(|reg| HandlerSummary {
                name: reg.manifest.name.clone(),
                enabled: reg.enabled,
                i_can: reg.manifest.i_can.clone(),
                handler: ResolvedHandler {
                    uid: reg.uid,
                    handler: reg.instance.clone(),
                },
            })
            .collect()
    }

    pub async fn global_var_defaults(&self) -> Vec<(String, Value)> {
        let inner = self.inner.read().await;
        inner
            .handlers
            .values()
            .flat_map(|reg| reg.manifest.global_vars.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl HandlerResolver for HandlerRegistry {
    async fn resolve(&self, handler: &str, entry_point: &str) -> Result<ResolvedHandler, DialogError> {
        let inner = self.inner.read().await;
        let reg = inner
            .handlers
            .get(handler)
            .filter(|reg| reg.enabled)
            .ok_or_else(|| DialogError::UnknownHandler(handler.to_string()))?;
        if !reg.instance.entry_points().contains(&entry_point) {
            return Err(DialogError::UnknownEntryPoint {
                handler: handler.to_string(),
                entry_point: entry_point.to_string(),
            });
        }
        Ok(ResolvedHandler {
            uid: reg.uid,
            handler: reg.instance.clone(),
        })
    }

    async fn session_var_defaults(&self) -> Vec<(String, Value)> {
        let inner = self.inner.read().await;
        inner
            .handlers
            .values()
            .flat_map(|reg| reg.manifest.session_vars.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{HandlerRecord, MemoryStore};
    use lisa_dialog::HandlerCall;
    use serde_json::json;

    struct Weather;

    #[async_trait]
    impl Handler for Weather {
        fn name(&self) -> &str {
            "Weather"
        }

        fn entry_points(&self) -> &[&'static str] {
            &["today", "tomorrow"]
        }

        async fn invoke(&self, entry_point: &str, _call: HandlerCall) -> anyhow::Result<Option<String>> {
            Ok(Some(format!("weather {entry_point}")))
        }
    }

    fn manifest() -> HandlerManifest {
        HandlerManifest::new("Weather")
            .with_i_can("weather_i_can")
            .with_intent("weather_today", "today", None)
            .with_intent("weather_tomorrow", "tomorrow", None)
            .with_session_var("city", json!("Paris"))
            .with_global_var("units", json!("metric"))
            .with_rule(RuleRecord {
                name: "weather_log".into(),
                order: 1,
                enabled: true,
                before: Some("log".into()),
                after: None,
                end: false,
                handler: None,
                args: Value::Null,
            })
            .with_cron(CronRecord {
                name: "morning".into(),
                handler: String::new(),
                entry_point: "today".into(),
                schedule: "0 0 7 * * *".into(),
                enabled: true,
            })
    }

    async fn registry() -> HandlerRegistry {
        let registry = HandlerRegistry::new();
        registry.register(manifest(), Arc::new(Weather)).await.unwrap();
        registry
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = registry().await;
        let resolved = registry.resolve("Weather", "today").await.unwrap();
        assert_eq!(resolved.name(), "Weather");

        let err = registry.resolve("Weather", "yesterday").await.err().unwrap();
        assert!(matches!(err, DialogError::UnknownEntryPoint { .. }));
        let err = registry.resolve("Radio", "play").await.err().unwrap();
        assert!(matches!(err, DialogError::UnknownHandler(_)));

        let intent = registry.intent("weather_today").await.unwrap();
        assert_eq!(intent.handler, "Weather");
        assert_eq!(registry.rules().await[0].handler.as_deref(), Some("Weather"));
        assert_eq!(registry.crons().await[0].handler, "Weather");
        assert_eq!(
            registry.session_var_defaults().await,
            vec![("city".to_string(), json!("Paris"))]
        );
        assert_eq!(registry.global_var_defaults().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_manifests() {
        let registry = registry().await;
        assert!(registry.register(manifest(), Arc::new(Weather)).await.is_err());

        let other = HandlerRegistry::new();
        let bad = HandlerManifest::new("Weather").with_intent("x", "nowcast", None);
        assert!(other.register(bad, Arc::new(Weather)).await.is_err());
        let renamed = HandlerManifest::new("Radio");
        assert!(other.register(renamed, Arc::new(Weather)).await.is_err());
    }

    #[tokio::test]
    async fn test_disable_cascades() {
        let registry = registry().await;
        assert!(registry.set_handler_enabled("Weather", false).await);
        assert!(registry.intents().await.iter().all(|i| !i.enabled));
        assert!(registry.rules().await.iter().all(|r| !r.enabled));
        assert!(registry.crons().await.iter().all(|c| !c.enabled));
        assert!(matches!(
            registry.resolve("Weather", "today").await,
            Err(DialogError::UnknownHandler(_))
        ));

        assert!(registry.set_handler_enabled("Weather", true).await);
        assert!(registry.intent("weather_today").await.unwrap().enabled);
        assert!(!registry.set_handler_enabled("Radio", true).await);
    }

    #[tokio::test]
    async fn test_store_overrides_manifest() {
        let registry = registry().await;
        let store = MemoryStore::new(StoreDocument {
            intents: vec![IntentRecord {
                name: "weather_today".into(),
                handler: "Weather".into(),
                entry_point: "tomorrow".into(),
                enabled: true,
                i_can: None,
            }],
            ..Default::default()
        });
        registry.reload(&store).await.unwrap();
        assert_eq!(registry.intent("weather_today").await.unwrap().entry_point, "tomorrow");

        store
            .replace(StoreDocument {
                handlers: vec![HandlerRecord {
                    name: "Weather".into(),
                    enabled: false,
                }],
                ..Default::default()
            })
            .await;
        registry.reload(&store).await.unwrap();
        assert_eq!(registry.intent("weather_today").await.unwrap().entry_point, "today");
        assert!(!registry.intent("weather_today").await.unwrap().enabled);
        assert!(!registry.handlers().await[0].enabled);
    }

    #[tokio::test]
    async fn test_toggles_survive_reload() {
        let registry = registry().await;
        registry
            .ensure_rule(RuleRecord {
                name: "DefaultAnswer".into(),
                order: 999,
                enabled: true,
                before: None,
                after: Some("default_answer".into()),
                end: true,
                handler: None,
                args: Value::Null,
            })
            .await;
        assert!(registry.set_intent_enabled("weather_tomorrow", false).await);
        registry.reload(&MemoryStore::default()).await.unwrap();
        assert!(!registry.intent("weather_tomorrow").await.unwrap().enabled);
        assert!(registry.rules().await.iter().any(|r| r.name == "DefaultAnswer"));
        assert!(!registry.set_intent_enabled("nope", false).await);
    }
}
