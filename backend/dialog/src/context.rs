//! Dialog operations, as seen from one session (or from the system).

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use lisa_core::{Destinations, HandlerUid, SessionId, Utterance};
use lisa_gateway::{ServerCommand, ServerMessage, Session};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::engine::{log_step, DialogEngine, DialogState};
use crate::error::DialogError;
use crate::handler::HandlerCall;
use crate::question::{AnswerCallback, PendingQuestion, Question};
use crate::step::{StepId, StepKind};

/// Result of one guarded handler turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// The entry point ran; `reply` is its returned text.
    Completed {
        uid: HandlerUid,
        handler: String,
        entry_point: String,
        reply: Option<String>,
    },
    /// The input went to the pending question.
    Answered,
    /// Refused or failed; the session has already been notified.
    Refused(StepKind),
}

/// Handle on the dialog engine bound to a session and, inside handler
/// code, to the handler being run.
#[derive(Clone)]
pub struct DialogContext {
    engine: DialogEngine,
    session: Option<Session>,
    handler: Option<HandlerUid>,
}

impl DialogContext {
    pub(crate) fn new(engine: DialogEngine, session: Option<Session>, handler: Option<HandlerUid>) -> Self {
        Self {
            engine,
            session,
            handler,
        }
    }

    pub fn engine(&self) -> &DialogEngine {
        &self.engine
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn handler_uid(&self) -> Option<HandlerUid> {
        self.handler
    }

    pub fn for_handler(&self, uid: HandlerUid) -> Self {
        Self {
            handler: Some(uid),
            ..self.clone()
        }
    }

    /// Full turn: answer the pending question if there is one, otherwise
    /// run the handler and speak whatever text it returns.
    pub async fn handle_utterance(
        &self,
        utterance: Utterance,
        handler: &str,
        entry_point: &str,
    ) -> Result<Turn, DialogError> {
        if self.has_pending_question().await {
            self.resolve_answer(Some(utterance)).await?;
            return Ok(Turn::Answered);
        }
        let turn = self.invoke_handler(utterance, handler, entry_point).await?;
        if let Turn::Completed {
            uid,
            reply: Some(text),
            ..
        } = &turn
        {
            self.for_handler(*uid).speak(text.clone()).await;
        }
        Ok(turn)
    }

    /// Confidence gate, resolution and guarded invocation. The returned
    /// text is handed back instead of spoken.
    pub async fn invoke_handler(
        &self,
        utterance: Utterance,
        handler: &str,
        entry_point: &str,
    ) -> Result<Turn, DialogError> {
        let threshold = self.engine.settings().confidence_threshold;
        if !utterance.outcome.is_confident(threshold) {
            debug!(
                intent = ?utterance.intent(),
                confidence = ?utterance.outcome.confidence,
                threshold,
                "Confidence below threshold"
            );
            self.record(
                StepKind::ErrorLowConfidence,
                Some(json!({
                    "intent": utterance.intent(),
                    "confidence": utterance.outcome.confidence,
                    "threshold": threshold,
                })),
            )
            .await;
            self.notify("error_intent_low_confidence").await;
            return Ok(Turn::Refused(StepKind::ErrorLowConfidence));
        }

        let resolved = match self.engine.resolver().resolve(handler, entry_point).await {
            Ok(resolved) => resolved,
            Err(e) => {
                let kind = match e {
                    DialogError::UnknownHandler(_) => StepKind::ErrorUnknownHandler,
                    DialogError::UnknownEntryPoint { .. } => StepKind::ErrorUnknownEntryPoint,
                    DialogError::HandlerFault { .. } => StepKind::ErrorHandlerFault,
                };
                warn!(handler = %handler, entry_point = %entry_point, error = %e, "Handler resolution failed");
                self.record(
                    kind,
                    Some(json!({ "handler": handler, "entry_point": entry_point, "error": e.to_string() })),
                )
                .await;
                self.notify(e.notice_key()).await;
                return Ok(Turn::Refused(kind));
            }
        };

        let context = self.for_handler(resolved.uid);
        context
            .record(
                StepKind::HandlerCall,
                Some(json!({
                    "handler": handler,
                    "entry_point": entry_point,
                    "utterance": serde_json::to_value(&utterance).ok(),
                })),
            )
            .await;

        let call = HandlerCall {
            utterance,
            context: context.clone(),
        };
        let outcome = AssertUnwindSafe(resolved.handler.invoke(entry_point, call))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(reply)) => Ok(Turn::Completed {
                uid: resolved.uid,
                handler: handler.to_string(),
                entry_point: entry_point.to_string(),
                reply,
            }),
            Ok(Err(source)) => {
                context.report_fault(handler, source).await?;
                Ok(Turn::Refused(StepKind::ErrorHandlerFault))
            }
            Err(panic) => {
                context.report_panic(handler, panic).await;
                Ok(Turn::Refused(StepKind::ErrorHandlerFault))
            }
        }
    }

    /// Say `text` to the calling session.
    pub async fn speak(&self, text: impl Into<String>) -> StepId {
        self.say(text.into(), None).await
    }

    pub async fn speak_to(&self, text: impl Into<String>, to: Destinations) -> StepId {
        self.say(text.into(), Some(to)).await
    }

    async fn say(&self, text: String, to: Option<Destinations>) -> StepId {
        let to = self.destinations(to);
        let step = self
            .record(StepKind::HandlerSpeech, Some(json!({ "text": text, "to": to })))
            .await;
        if to.is_empty() {
            warn!(step_id = %step, "Speech has no destination");
        } else {
            self.engine.registry().deliver(&ServerMessage::chat(text), &to).await;
        }
        step
    }

    /// Put a question and wait, without blocking, for the answer.
    ///
    /// An outstanding question of this session is first resolved with no
    /// answer. `callback` runs once: with the answer, or with `None` when
    /// the deadline passes.
    pub async fn ask(
        &self,
        question: impl Into<Question>,
        callback: impl AnswerCallback + 'static,
    ) -> Result<StepId, DialogError> {
        self.ask_with(question.into(), Arc::new(callback)).await
    }

    pub async fn ask_with(
        &self,
        question: Question,
        callback: Arc<dyn AnswerCallback>,
    ) -> Result<StepId, DialogError> {
        let key = self.session_id();
        let to = self.destinations(question.to);
        let timer = CancellationToken::new();
        let payload = json!({ "text": question.text, "nlu_context": question.nlu_context, "to": to });
        let (step, displaced) = {
            let mut state = self.engine.inner.state.lock().await;
            // Any outstanding question is closed in the same critical
            // section that installs the new one.
            let displaced = state
                .pending
                .remove(&key)
                .map(|pending| close_pending(&mut state, key, pending, None));
            let step = state
                .steps
                .append(StepKind::HandlerQuestion, Some(payload), key, self.handler);
            let pending = PendingQuestion {
                step,
                origin: self.session.clone(),
                handler: self.handler,
                to: to.clone(),
                nlu_context: question.nlu_context.clone(),
                callback,
                timer: timer.clone(),
            };
            state.pending.insert(key, pending);
            (step, displaced)
        };

        let displaced = match displaced {
            Some((pending, answer_step)) => {
                debug!(question = %pending.step, "Question displaced by a newer one");
                self.finish_pending(pending, answer_step, None).await
            }
            None => Ok(()),
        };
        log_step(step, StepKind::HandlerQuestion, key);

        self.arm_timer(step, timer);
        self.engine
            .registry()
            .deliver(&ServerMessage::ask(question.text, question.nlu_context), &to)
            .await;
        displaced?;
        Ok(step)
    }

    fn arm_timer(&self, step: StepId, timer: CancellationToken) {
        let context = self.clone();
        let timeout = self.engine.settings().question_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    debug!(step_id = %step, "Question timed out");
                    if let Err(e) = context.resolve_pending(Some(step), None).await {
                        error!(step_id = %step, error = %e, "Answer callback failed after timeout");
                    }
                }
            }
        });
    }

    pub async fn has_pending_question(&self) -> bool {
        self.engine.has_pending(self.session_id()).await
    }

    /// NLU context of the pending question, if any.
    pub async fn pending_nlu_context(&self) -> Option<Value> {
        let state = self.engine.inner.state.lock().await;
        state
            .pending
            .get(&self.session_id())
            .and_then(|p| p.nlu_context.clone())
    }

    /// Resolve the pending question with `answer`. Returns false when
    /// there was none.
    pub async fn resolve_answer(&self, answer: Option<Utterance>) -> Result<bool, DialogError> {
        self.resolve_pending(None, answer).await
    }

    /// `expected` restricts resolution to one question step, so a stale
    /// timer cannot resolve a newer question.
    async fn resolve_pending(
        &self,
        expected: Option<StepId>,
        answer: Option<Utterance>,
    ) -> Result<bool, DialogError> {
        let key = self.session_id();
        let (pending, answer_step) = {
            let mut state = self.engine.inner.state.lock().await;
            let current = state.pending.get(&key).map(|p| p.step);
            match (current, expected) {
                (None, _) => return Ok(false),
                (Some(step), Some(expected)) if step != expected => return Ok(false),
                _ => {}
            }
            let Some(pending) = state.pending.remove(&key) else {
                return Ok(false);
            };
            close_pending(&mut state, key, pending, answer.as_ref())
        };
        self.finish_pending(pending, answer_step, answer).await?;
        Ok(true)
    }

    /// Lock-free half of resolution: run the callback, then switch the
    /// question's destinations back to normal listening.
    async fn finish_pending(
        &self,
        pending: PendingQuestion,
        answer_step: StepId,
        answer: Option<Utterance>,
    ) -> Result<(), DialogError> {
        let key = self.session_id();
        log_step(answer_step, StepKind::Answer, key);
        debug!(question = %pending.step, answer = %answer_step, answered = answer.is_some(), "Question resolved");

        let context = DialogContext::new(self.engine.clone(), pending.origin.clone(), pending.handler);
        let outcome = AssertUnwindSafe(pending.callback.on_answer(context.clone(), answer))
            .catch_unwind()
            .await;

        self.engine
            .registry()
            .deliver(&ServerMessage::Command(ServerCommand::Kws), &pending.to)
            .await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => context.report_fault("answer callback", source).await,
            Err(panic) => {
                context.report_panic("answer callback", panic).await;
                Ok(())
            }
        }
    }

    /// Deliver a localized notice to the calling session.
    pub async fn notify(&self, key: &str) {
        let Some(session) = &self.session else {
            warn!(key = %key, "Notice without a session");
            return;
        };
        let text = self.engine.catalog().tr(key);
        self.engine
            .registry()
            .deliver(&ServerMessage::chat(text), &Destinations::session(session.id))
            .await;
    }

    /// Tell the clients of `zones` to stop speaking.
    pub async fn mute(&self, zones: &Destinations) -> usize {
        self.engine.registry().mute(zones).await
    }

    pub async fn declare_session_var(&self, name: &str, default: Value) -> bool {
        let Some(id) = self.session_id() else {
            return false;
        };
        let mut state = self.engine.inner.state.lock().await;
        state.sessions.entry(id).or_default().declare(name, default)
    }

    pub async fn session_var(&self, name: &str) -> Option<Value> {
        let id = self.session_id()?;
        let state = self.engine.inner.state.lock().await;
        state.sessions.get(&id)?.get(name).cloned()
    }

    pub async fn session_var_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let id = self.session_id()?;
        let state = self.engine.inner.state.lock().await;
        state.sessions.get(&id)?.get_as(name)
    }

    pub async fn set_session_var(&self, name: &str, value: Value) -> bool {
        let Some(id) = self.session_id() else {
            return false;
        };
        let mut state = self.engine.inner.state.lock().await;
        state.sessions.entry(id).or_default().set(name, value);
        true
    }

    pub async fn declare_global_var(&self, name: &str, default: Value) -> bool {
        self.engine.declare_global_var(name, default).await
    }

    pub async fn global_var(&self, name: &str) -> Option<Value> {
        let state = self.engine.inner.state.lock().await;
        state.globals.get(name).cloned()
    }

    pub async fn global_var_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.engine.inner.state.lock().await.globals.get_as(name)
    }

    pub async fn set_global_var(&self, name: &str, value: Value) -> Option<Value> {
        self.engine.inner.state.lock().await.globals.set(name, value)
    }

    async fn record(&self, kind: StepKind, payload: Option<Value>) -> StepId {
        self.engine
            .record(kind, payload, self.session_id(), self.handler)
            .await
    }

    fn destinations(&self, explicit: Option<Destinations>) -> Destinations {
        match (explicit, &self.session) {
            (Some(to), _) => to,
            (None, Some(session)) => Destinations::session(session.id),
            (None, None) => Destinations::default(),
        }
    }

    /// Record a handler error; re-raise it in diagnostic mode, otherwise
    /// tell the session.
    async fn report_fault(&self, handler: &str, source: anyhow::Error) -> Result<(), DialogError> {
        error!(handler = %handler, error = %source, "Handler fault");
        self.record(
            StepKind::ErrorHandlerFault,
            Some(json!({ "handler": handler, "error": format!("{source:#}") })),
        )
        .await;
        if self.engine.settings().handler_faults {
            return Err(DialogError::HandlerFault {
                handler: handler.to_string(),
                source,
            });
        }
        self.notify("error_handler_exec").await;
        Ok(())
    }

    async fn report_panic(&self, handler: &str, panic: Box<dyn Any + Send>) {
        let message = panic_message(panic.as_ref());
        error!(handler = %handler, panic = %message, "Handler panicked");
        self.record(
            StepKind::ErrorHandlerFault,
            Some(json!({ "handler": handler, "error": message, "panic": true })),
        )
        .await;
        if self.engine.settings().handler_faults {
            std::panic::resume_unwind(panic);
        }
        self.notify("error_handler_exec").await;
    }
}

/// Stop the question's timer and record its answer step. Runs under the
/// dialog lock.
fn close_pending(
    state: &mut DialogState,
    key: Option<SessionId>,
    pending: PendingQuestion,
    answer: Option<&Utterance>,
) -> (PendingQuestion, StepId) {
    pending.timer.cancel();
    let payload = answer.and_then(|u| serde_json::to_value(u).ok());
    let answer_step = state
        .steps
        .append(StepKind::Answer, payload, key, pending.handler);
    state.steps.link_answer(pending.step, answer_step);
    (pending, answer_step)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
