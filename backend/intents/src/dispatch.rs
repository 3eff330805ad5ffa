/// Intent dispatch: decoding, rule pipeline and handler invocation for
/// one chat turn.
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use lisa_core::{DispatchResult, NluClient, Outcome, Utterance};
use lisa_dialog::{DialogContext, DialogEngine, Turn};
use lisa_gateway::{ChatHandler, ChatRequest, Session};
use lisa_hooks::{ActionRegistry, RuleError, RulePipeline, RuleSet};
use lisa_plugins::{HandlerRegistry, RegistrationStore};
use serde_json::Map;
use tracing::{debug, info, warn};

pub struct IntentDispatcher {
    engine: DialogEngine,
    registry: HandlerRegistry,
    actions: ActionRegistry,
    pipeline: RulePipeline,
    nlu: Arc<dyn NluClient>,
    trace_nlu: bool,
}

impl IntentDispatcher {
    pub fn new(
        engine: DialogEngine,
        registry: HandlerRegistry,
        actions: ActionRegistry,
        nlu: Arc<dyn NluClient>,
    ) -> Self {
        Self {
            engine,
            registry,
            actions,
            pipeline: RulePipeline::new(RuleSet::new(), false),
            nlu,
            trace_nlu: false,
        }
    }

    /// Dump rule input/output and NLU outcomes at debug level.
    pub fn with_tracing(mut self, rules: bool, nlu: bool) -> Self {
        self.pipeline.trace = rules;
        self.trace_nlu = nlu;
        self
    }

    pub fn engine(&self) -> &DialogEngine {
        &self.engine
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn rules(&self) -> &RuleSet {
        &self.pipeline.rules
    }

    /// Rebuild the live rule set from the registered rule records.
    pub async fn sync_rules(&self) -> Result<usize, RuleError> {
        let rules = self
            .registry
            .rules()
            .await
            .iter()
            .map(|record| self.actions.build(record))
            .collect::<Result<Vec<_>, _>>()?;
        let count = rules.len();
        self.pipeline.rules.replace_all(rules).await;
        Ok(count)
    }

    /// Create the handlers' global variables that do not exist yet.
    /// Returns how many were created.
    pub async fn declare_global_vars(&self) -> usize {
        let mut created = 0;
        for (name, value) in self.registry.global_var_defaults().await {
            if self.engine.declare_global_var(&name, value).await {
                created += 1;
            }
        }
        created
    }

    /// Re-read the registration store, declare new global variables and
    /// refresh the rule set.
    pub async fn reload(&self, store: &dyn RegistrationStore) -> Result<()> {
        self.registry.reload(store).await?;
        self.declare_global_vars().await;
        let rules = self.sync_rules().await?;
        info!(rules, "Dispatch tables reloaded");
        Ok(())
    }

    /// Enable or disable a handler together with its intents, rules and crons.
    pub async fn set_handler_enabled(&self, name: &str, enabled: bool) -> bool {
        if !self.registry.set_handler_enabled(name, enabled).await {
            return false;
        }
        self.pipeline.rules.set_enabled_for_handler(name, enabled).await;
        true
    }

    /// Handle one chat payload from a logged-in session.
    pub async fn dispatch(&self, session: &Session, chat: ChatRequest) -> Result<()> {
        let context = self.engine.context(session.clone());
        let body = chat.body.filter(|b| !b.trim().is_empty());

        let outcome = match (chat.outcome, &body) {
            (Some(outcome), _) => outcome,
            (None, Some(text)) => match self.decode(&context, text).await {
                Some(outcome) => outcome,
                None => return Ok(()),
            },
            (None, None) => {
                debug!(session = %session.id, "Empty chat dropped");
                return Ok(());
            }
        };

        let mut utterance = Utterance {
            body,
            outcome,
            from: session.name.clone(),
            zone: session.zone.clone(),
            session_id: Some(session.id),
            metadata: Map::new(),
        };

        if context.has_pending_question().await {
            context.resolve_answer(Some(utterance)).await?;
            return Ok(());
        }

        self.pipeline.before(&mut utterance, &context).await;

        let intent = match utterance.intent() {
            Some(name) => self.registry.intent(name).await.filter(|i| i.enabled),
            None => None,
        };
        let mut result = match intent {
            Some(intent) => {
                let turn = context
                    .invoke_handler(utterance, &intent.handler, &intent.entry_point)
                    .await?;
                match turn {
                    Turn::Completed {
                        uid,
                        handler,
                        entry_point,
                        reply,
                    } => DispatchResult {
                        handler: Some(handler),
                        handler_uid: Some(uid),
                        entry_point: Some(entry_point),
                        body: reply,
                        from: session.name.clone(),
                        session_id: Some(session.id),
                    },
                    Turn::Answered | Turn::Refused(_) => DispatchResult {
                        handler: Some(intent.handler),
                        entry_point: Some(intent.entry_point),
                        from: session.name.clone(),
                        session_id: Some(session.id),
                        ..DispatchResult::default()
                    },
                }
            }
            None => {
                debug!(session = %session.id, intent = ?utterance.intent(), "No handler for intent");
                DispatchResult::fallback(
                    session.name.clone(),
                    Some(session.id),
                    self.engine.catalog().tr("no_handler"),
                )
            }
        };

        self.pipeline.after(&mut result, &context).await;
        Ok(())
    }

    /// NLU decoding. A failure is reported to the session, except while a
    /// question is pending: then the raw text still goes to the question.
    async fn decode(&self, context: &DialogContext, text: &str) -> Option<Outcome> {
        let nlu_context = context.pending_nlu_context().await;
        match self.nlu.decode(text, nlu_context.as_ref()).await {
            Ok(outcome) => {
                if self.trace_nlu {
                    debug!(provider = %self.nlu.name(), text = %text, outcome = ?outcome, "NLU outcome");
                }
                Some(outcome)
            }
            Err(e) => {
                warn!(provider = %self.nlu.name(), error = %e, "NLU decoding failed");
                if context.has_pending_question().await {
                    return Some(Outcome::default());
                }
                context.notify("error_nlu").await;
                None
            }
        }
    }
}

#[async_trait]
impl ChatHandler for IntentDispatcher {
    async fn on_login(&self, session: &Session) {
        self.engine.open_session(session).await;
    }

    async fn on_chat(&self, session: &Session, chat: ChatRequest) -> Result<()> {
        self.dispatch(session, chat).await
    }

    async fn step_count(&self) -> usize {
        self.engine.step_count().await
    }
}
