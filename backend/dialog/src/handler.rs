//! Handler contract.
//!
//! A handler is a named unit exposing entry points. The dispatch engine
//! looks handlers up by name through a [`HandlerResolver`].

use std::sync::Arc;

use async_trait::async_trait;
use lisa_core::{HandlerUid, Utterance};
use serde_json::Value;

use crate::context::DialogContext;
use crate::error::DialogError;

/// Input of one entry-point call.
pub struct HandlerCall {
    pub utterance: Utterance,
    /// Context bound to the calling session and to this handler.
    pub context: DialogContext,
}

#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    fn entry_points(&self) -> &[&'static str];

    /// Run `entry_point`. Returned text is spoken to the caller; handlers
    /// that reply through `speak`/`ask` themselves return `None`.
    async fn invoke(&self, entry_point: &str, call: HandlerCall) -> anyhow::Result<Option<String>>;

    /// Handler-local translation of a capability or message key.
    fn translate(&self, _key: &str) -> Option<String> {
        None
    }
}

/// A live handler instance with its registration identity.
#[derive(Clone)]
pub struct ResolvedHandler {
    pub uid: HandlerUid,
    pub handler: Arc<dyn Handler>,
}

impl ResolvedHandler {
    pub fn name(&self) -> &str {
        self.handler.name()
    }
}

#[async_trait]
pub trait HandlerResolver: Send + Sync {
    /// Find an enabled handler exposing `entry_point`.
    async fn resolve(&self, handler: &str, entry_point: &str) -> Result<ResolvedHandler, DialogError>;

    /// Per-session variable defaults declared by registered handlers.
    async fn session_var_defaults(&self) -> Vec<(String, Value)> {
        Vec::new()
    }
}
