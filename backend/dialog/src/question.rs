//! Ask/answer primitives.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use lisa_core::{Destinations, HandlerUid, Utterance};
use lisa_gateway::Session;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::context::DialogContext;
use crate::step::StepId;

/// Receives the reply to a question, or `None` on timeout.
#[async_trait]
pub trait AnswerCallback: Send + Sync {
    async fn on_answer(&self, context: DialogContext, answer: Option<Utterance>) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> AnswerCallback for F
where
    F: Fn(DialogContext, Option<Utterance>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn on_answer(&self, context: DialogContext, answer: Option<Utterance>) -> anyhow::Result<()> {
        (self)(context, answer).await
    }
}

/// A question to put to one or more sessions.
#[derive(Debug, Clone, Default)]
pub struct Question {
    pub text: String,
    /// Hint forwarded to the client and the NLU collaborator.
    pub nlu_context: Option<Value>,
    /// Explicit destinations; the asking session when `None`.
    pub to: Option<Destinations>,
}

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_nlu_context(mut self, context: Value) -> Self {
        self.nlu_context = Some(context);
        self
    }

    pub fn to(mut self, destinations: Destinations) -> Self {
        self.to = Some(destinations);
        self
    }
}

impl From<&str> for Question {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Question {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// The suspended turn of a session waiting for a reply.
pub(crate) struct PendingQuestion {
    pub step: StepId,
    pub origin: Option<Session>,
    pub handler: Option<HandlerUid>,
    pub to: Destinations,
    pub nlu_context: Option<Value>,
    pub callback: Arc<dyn AnswerCallback>,
    pub timer: CancellationToken,
}
