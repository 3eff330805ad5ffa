//! Append-only step log.
//!
//! Steps live in an arena addressed by [`StepId`]. Every step sits on the
//! global chain, on its session's chain when it has a session, and on its
//! handler's chain when a handler produced it. Back links are captured when
//! the step is created; forward links are kept in per-chain maps and only
//! ever filled in once, when the next step of that chain arrives.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use lisa_core::{HandlerUid, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub u64);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    HandlerCall,
    HandlerSpeech,
    HandlerQuestion,
    Answer,
    ErrorLowConfidence,
    ErrorUnknownHandler,
    ErrorUnknownEntryPoint,
    ErrorHandlerFault,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HandlerCall => "handler call",
            Self::HandlerSpeech => "handler speech",
            Self::HandlerQuestion => "handler question",
            Self::Answer => "answer",
            Self::ErrorLowConfidence => "error: low confidence",
            Self::ErrorUnknownHandler => "error: unknown handler",
            Self::ErrorUnknownEntryPoint => "error: unknown entry point",
            Self::ErrorHandlerFault => "error: handler exception",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ErrorLowConfidence
                | Self::ErrorUnknownHandler
                | Self::ErrorUnknownEntryPoint
                | Self::ErrorHandlerFault
        )
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub id: StepId,
    pub created_at: DateTime<Utc>,
    pub kind: StepKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<HandlerUid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_global: Option<StepId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_session: Option<StepId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_handler: Option<StepId>,
}

/// Selects one of the three chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    Global,
    Session(SessionId),
    Handler(HandlerUid),
}

#[derive(Debug, Default)]
struct Cursor {
    first: Option<StepId>,
    last: Option<StepId>,
    count: usize,
}

impl Cursor {
    /// Move to `id`, returning the previous tail.
    fn push(&mut self, id: StepId) -> Option<StepId> {
        let prev = self.last.replace(id);
        if self.first.is_none() {
            self.first = Some(id);
        }
        self.count += 1;
        prev
    }
}

#[derive(Debug, Default)]
pub struct StepLog {
    steps: Vec<Step>,
    global: Cursor,
    sessions: HashMap<SessionId, Cursor>,
    handlers: HashMap<HandlerUid, Cursor>,
    global_next: HashMap<StepId, StepId>,
    session_next: HashMap<StepId, StepId>,
    handler_next: HashMap<StepId, StepId>,
    answers: HashMap<StepId, StepId>,
}

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, id: StepId) -> Option<&Step> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.steps.get(index)
    }

    /// Append a step and link it into every chain it belongs to.
    pub fn append(
        &mut self,
        kind: StepKind,
        payload: Option<Value>,
        session: Option<SessionId>,
        handler: Option<HandlerUid>,
    ) -> StepId {
        let id = StepId(self.steps.len() as u64 + 1);

        let prev_global = self.global.push(id);
        if let Some(prev) = prev_global {
            self.global_next.insert(prev, id);
        }
        let prev_session = session.and_then(|s| self.sessions.entry(s).or_default().push(id));
        if let Some(prev) = prev_session {
            self.session_next.insert(prev, id);
        }
        let prev_handler = handler.and_then(|h| self.handlers.entry(h).or_default().push(id));
        if let Some(prev) = prev_handler {
            self.handler_next.insert(prev, id);
        }

        self.steps.push(Step {
            id,
            created_at: Utc::now(),
            kind,
            payload,
            session,
            handler,
            prev_global,
            prev_session,
            prev_handler,
        });
        id
    }

    /// Record that `answer` resolved `question`. A question is answered once.
    pub fn link_answer(&mut self, question: StepId, answer: StepId) -> bool {
        if self.answers.contains_key(&question) {
            return false;
        }
        self.answers.insert(question, answer);
        true
    }

    pub fn answer_of(&self, question: StepId) -> Option<StepId> {
        self.answers.get(&question).copied()
    }

    /// Question step resolved by `answer`, if any.
    pub fn question_of(&self, answer: StepId) -> Option<StepId> {
        self.answers
            .iter()
            .find_map(|(q, a)| (*a == answer).then_some(*q))
    }

    pub fn next(&self, chain: Chain, id: StepId) -> Option<StepId> {
        let links = match chain {
            Chain::Global => &self.global_next,
            Chain::Session(_) => &self.session_next,
            Chain::Handler(_) => &self.handler_next,
        };
        links.get(&id).copied()
    }

    fn cursor(&self, chain: Chain) -> Option<&Cursor> {
        match chain {
            Chain::Global => Some(&self.global),
            Chain::Session(id) => self.sessions.get(&id),
            Chain::Handler(id) => self.handlers.get(&id),
        }
    }

    pub fn first(&self, chain: Chain) -> Option<StepId> {
        self.cursor(chain).and_then(|c| c.first)
    }

    pub fn last(&self, chain: Chain) -> Option<StepId> {
        self.cursor(chain).and_then(|c| c.last)
    }

    pub fn count(&self, chain: Chain) -> usize {
        self.cursor(chain).map_or(0, |c| c.count)
    }

    /// Walk a chain in creation order.
    pub fn iter(&self, chain: Chain) -> impl Iterator<Item = &Step> + '_ {
        let mut cursor = self.first(chain);
        std::iter::from_fn(move || {
            let step = self.get(cursor?)?;
            cursor = self.next(chain, step.id);
            Some(step)
        })
    }

    /// Write the global chain to the debug log.
    pub fn dump(&self) {
        for step in self.iter(Chain::Global) {
            debug!(
                step_id = %step.id,
                kind = %step.kind,
                session = ?step.session,
                handler = ?step.handler,
                payload = ?step.payload,
                "step"
            );
        }
    }
}
