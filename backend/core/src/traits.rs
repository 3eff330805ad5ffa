use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::message::Outcome;

/// External natural-language-understanding collaborator.
///
/// Given raw utterance text, returns at least an intent name and a
/// confidence score. `context` carries the optional NLU context attached
/// to a pending question.
#[async_trait]
pub trait NluClient: Send + Sync {
    /// Provider name (e.g., "wit", "keyword").
    fn name(&self) -> &str;

    async fn decode(&self, text: &str, context: Option<&Value>) -> Result<Outcome>;
}
