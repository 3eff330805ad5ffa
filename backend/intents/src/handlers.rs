/// Core handler: answers "what can you do" questions.
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use lisa_core::Catalog;
use lisa_dialog::{Handler, HandlerCall};
use lisa_plugins::{HandlerManifest, HandlerRegistry, HandlerSummary};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

pub const CORE_HANDLER: &str = "core";
pub const LIST_HANDLERS: &str = "list_handlers";
pub const LIST_HANDLER_INTENTS: &str = "list_handler_intents";

/// Capabilities quoted in a single reply.
const MAX_SAMPLED: usize = 4;

pub struct CoreHandler {
    registry: HandlerRegistry,
    catalog: Arc<Catalog>,
    rng: Mutex<StdRng>,
}

impl CoreHandler {
    pub fn new(registry: HandlerRegistry, catalog: Arc<Catalog>) -> Self {
        Self::with_rng(registry, catalog, StdRng::from_entropy())
    }

    pub fn with_rng(registry: HandlerRegistry, catalog: Arc<Catalog>, rng: StdRng) -> Self {
        Self {
            registry,
            catalog,
            rng: Mutex::new(rng),
        }
    }

    pub fn manifest() -> HandlerManifest {
        HandlerManifest::new(CORE_HANDLER)
            .with_intent("core_intents_list", LIST_HANDLERS, None)
            .with_intent("core_handler_intents", LIST_HANDLER_INTENTS, None)
    }

    /// Translate through the owning handler first, then the server catalog.
    fn translate(&self, owner: Option<&HandlerSummary>, key: &str) -> String {
        owner
            .and_then(|h| h.handler.handler.translate(key))
            .unwrap_or_else(|| self.catalog.tr(key))
    }

    fn compose(&self, items: Vec<String>) -> String {
        match self.rng.lock() {
            Ok(mut rng) => compose_capabilities(items, &mut *rng, &self.catalog),
            Err(poisoned) => compose_capabilities(items, &mut *poisoned.into_inner(), &self.catalog),
        }
    }

    async fn list_handlers(&self) -> String {
        let items: Vec<String> = self
            .registry
            .handlers()
            .await
            .iter()
            .filter(|h| h.enabled)
            .filter_map(|h| h.i_can.as_deref().map(|key| self.translate(Some(h), key)))
            .collect();
        debug!(capabilities = items.len(), "Listing handler capabilities");
        if items.is_empty() {
            return self.catalog.tr("core_no_capability");
        }
        self.compose(items)
    }

    async fn list_handler_intents(&self, call: &HandlerCall) -> String {
        let Some(wanted) = call.utterance.outcome.entity_value("handler_name").map(normalize) else {
            return self.catalog.tr("core_intent_no_handler");
        };
        let handlers = self.registry.handlers().await;
        let items: Vec<String> = self
            .registry
            .intents()
            .await
            .iter()
            .filter(|i| i.enabled && normalize(&i.handler) == wanted)
            .filter_map(|i| {
                let owner = handlers.iter().find(|h| h.name == i.handler);
                i.i_can.as_deref().map(|key| self.translate(owner, key))
            })
            .collect();
        if items.is_empty() {
            return self.catalog.tr("core_intent_no_handler");
        }
        self.compose(items)
    }
}

#[async_trait]
impl Handler for CoreHandler {
    fn name(&self) -> &str {
        CORE_HANDLER
    }

    fn entry_points(&self) -> &[&'static str] {
        &[LIST_HANDLERS, LIST_HANDLER_INTENTS]
    }

    async fn invoke(&self, entry_point: &str, call: HandlerCall) -> Result<Option<String>> {
        match entry_point {
            LIST_HANDLERS => Ok(Some(self.list_handlers().await)),
            LIST_HANDLER_INTENTS => Ok(Some(self.list_handler_intents(&call).await)),
            other => anyhow::bail!("core handler has no entry point '{other}'"),
        }
    }
}

/// Lowercased with whitespace removed, so "Weather Station" matches "weatherstation".
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Up to four capabilities drawn without replacement, prefixed with the
/// "there are more" notice when some had to be left out.
pub fn compose_capabilities<R: Rng + ?Sized>(mut items: Vec<String>, rng: &mut R, catalog: &Catalog) -> String {
    let mut message = String::new();
    if items.len() > MAX_SAMPLED {
        message.push_str(&catalog.tr("i_can_do_many"));
        message.push_str(". ");
    }
    for _ in 0..MAX_SAMPLED {
        if items.is_empty() {
            break;
        }
        let picked = items.remove(rng.gen_range(0..items.len()));
        message.push_str(&picked);
        message.push_str(". ");
    }
    message.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn catalog() -> Catalog {
        Catalog::new("en", &HashMap::new())
    }

    fn items(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("cap{i}")).collect()
    }

    #[test]
    fn test_compose_few_items_uses_all() {
        let mut rng = StdRng::seed_from_u64(7);
        let message = compose_capabilities(items(3), &mut rng, &catalog());
        assert!(!message.starts_with("I can do many things"));
        for i in 0..3 {
            assert!(message.contains(&format!("cap{i}.")));
        }
    }

    #[test]
    fn test_compose_many_items_samples_four_distinct() {
        let mut rng = StdRng::seed_from_u64(42);
        let message = compose_capabilities(items(9), &mut rng, &catalog());
        let rest = message
            .strip_prefix("I can do many things, for example. ")
            .unwrap();
        let picked: Vec<_> = rest.split(". ").map(|s| s.trim_end_matches('.')).collect();
        assert_eq!(picked.len(), 4);
        assert_eq!(picked.iter().collect::<HashSet<_>>().len(), 4);
    }

    #[test]
    fn test_compose_is_deterministic_with_seed() {
        let a = compose_capabilities(items(8), &mut StdRng::seed_from_u64(1), &catalog());
        let b = compose_capabilities(items(8), &mut StdRng::seed_from_u64(1), &catalog());
        assert_eq!(a, b);
        assert_eq!(compose_capabilities(Vec::new(), &mut StdRng::seed_from_u64(1), &catalog()), "");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(" Weather  Station"), "weatherstation");
    }
}
