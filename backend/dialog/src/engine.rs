//! Shared dialog state.
//!
//! One [`DialogEngine`] per process owns the step log, the variable
//! stores and every pending question. Its mutex guards structural
//! mutation only; handler code, callbacks, NLU and delivery always run
//! with the lock released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lisa_core::{Catalog, HandlerUid, SessionId};
use lisa_gateway::{Session, SessionRegistry};
use lisa_logging::{DialogEvent, DialogEventLogger};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use crate::context::DialogContext;
use crate::handler::HandlerResolver;
use crate::question::PendingQuestion;
use crate::step::{Chain, Step, StepId, StepKind, StepLog};
use crate::vars::VarStore;

#[derive(Debug, Clone)]
pub struct DialogSettings {
    /// Minimum decoding confidence for a handler to run.
    pub confidence_threshold: f64,
    /// How long a question waits before resolving with no answer.
    pub question_timeout: Duration,
    /// Diagnostic mode: handler faults propagate instead of being reported.
    pub handler_faults: bool,
}

impl Default for DialogSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            question_timeout: Duration::from_secs(20),
            handler_faults: false,
        }
    }
}

#[derive(Default)]
pub(crate) struct DialogState {
    pub steps: StepLog,
    pub globals: VarStore,
    pub sessions: HashMap<SessionId, VarStore>,
    /// Keyed by session; `None` holds the question of the system context.
    pub pending: HashMap<Option<SessionId>, PendingQuestion>,
}

pub(crate) struct EngineInner {
    pub registry: SessionRegistry,
    pub resolver: Arc<dyn HandlerResolver>,
    pub catalog: Arc<Catalog>,
    pub settings: DialogSettings,
    pub state: Mutex<DialogState>,
}

#[derive(Clone)]
pub struct DialogEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl DialogEngine {
    pub fn new(
        registry: SessionRegistry,
        resolver: Arc<dyn HandlerResolver>,
        catalog: Arc<Catalog>,
        settings: DialogSettings,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry,
                resolver,
                catalog,
                settings,
                state: Mutex::new(DialogState::default()),
            }),
        }
    }

    pub fn settings(&self) -> &DialogSettings {
        &self.inner.settings
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn resolver(&self) -> &Arc<dyn HandlerResolver> {
        &self.inner.resolver
    }

    /// Context for a logged-in session, declaring the handlers'
    /// per-session variable defaults the first time the session is seen.
    pub async fn open_session(&self, session: &Session) -> DialogContext {
        let defaults = self.inner.resolver.session_var_defaults().await;
        let mut state = self.inner.state.lock().await;
        let vars = state.sessions.entry(session.id).or_default();
        for (name, value) in defaults {
            vars.declare(&name, value);
        }
        drop(state);
        self.context(session.clone())
    }

    pub fn context(&self, session: Session) -> DialogContext {
        DialogContext::new(self.clone(), Some(session), None)
    }

    /// Context with no session, used for system notifications.
    pub fn system_context(&self) -> DialogContext {
        DialogContext::new(self.clone(), None, None)
    }

    pub async fn declare_global_var(&self, name: &str, default: Value) -> bool {
        self.inner.state.lock().await.globals.declare(name, default)
    }

    pub async fn step_count(&self) -> usize {
        self.inner.state.lock().await.steps.len()
    }

    pub async fn step(&self, id: StepId) -> Option<Step> {
        self.inner.state.lock().await.steps.get(id).cloned()
    }

    /// Snapshot of one chain in creation order.
    pub async fn steps(&self, chain: Chain) -> Vec<Step> {
        let state = self.inner.state.lock().await;
        state.steps.iter(chain).cloned().collect()
    }

    pub async fn answer_of(&self, question: StepId) -> Option<StepId> {
        self.inner.state.lock().await.steps.answer_of(question)
    }

    pub async fn dump(&self) {
        self.inner.state.lock().await.steps.dump();
    }

    pub async fn has_pending(&self, session: Option<SessionId>) -> bool {
        self.inner.state.lock().await.pending.contains_key(&session)
    }

    /// Stop every question timer without running callbacks.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        let pending = state.pending.len();
        for (_, question) in state.pending.drain() {
            question.timer.cancel();
        }
        info!(pending, steps = state.steps.len(), "Dialog engine shut down");
    }

    pub(crate) async fn record(
        &self,
        kind: StepKind,
        payload: Option<Value>,
        session: Option<SessionId>,
        handler: Option<HandlerUid>,
    ) -> StepId {
        let id = self
            .inner
            .state
            .lock()
            .await
            .steps
            .append(kind, payload, session, handler);
        log_step(id, kind, session);
        id
    }
}

pub(crate) fn log_step(id: StepId, kind: StepKind, session: Option<SessionId>) {
    let session = session.map(|s| s.to_string()).unwrap_or_default();
    DialogEventLogger::log_event(
        &session,
        DialogEvent::Step {
            step_id: id.0,
            kind: kind.as_str().to_string(),
        },
    );
}
