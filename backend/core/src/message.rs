use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{HandlerUid, SessionId};

/// Decoding outcome produced by the NLU collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Decoding certainty in [0, 1]. Missing means "not confident at all".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub entities: Map<String, Value>,
}

impl Outcome {
    pub fn new(intent: impl Into<String>, confidence: f64) -> Self {
        Self {
            intent: Some(intent.into()),
            confidence: Some(confidence),
            entities: Map::new(),
        }
    }

    pub fn with_entity(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entities
            .insert(name.into(), serde_json::json!({ "value": value.into() }));
        self
    }

    /// True when the confidence is present and reaches `threshold`.
    pub fn is_confident(&self, threshold: f64) -> bool {
        self.confidence.is_some_and(|c| c >= threshold)
    }

    /// String value of an entity, accepting both `{"value": ..}` and
    /// `[{"value": ..}, ..]` shapes.
    pub fn entity_value(&self, name: &str) -> Option<&str> {
        let entity = self.entities.get(name)?;
        let entity = match entity {
            Value::Array(items) => items.first()?,
            other => other,
        };
        entity.get("value").and_then(Value::as_str)
    }
}

/// The mutable decoded-input structure handed to rules and handlers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    /// Raw text as received, absent when the client sent a pre-decoded outcome only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub outcome: Outcome,
    /// Display name of the originating session.
    pub from: String,
    /// Zone name of the originating session.
    pub zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Free-form annotations added by before-rules.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Utterance {
    pub fn intent(&self) -> Option<&str> {
        self.outcome.intent.as_deref()
    }
}

/// Result of one dispatch turn, passed through the after-rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_uid: Option<HandlerUid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    /// Reply text still to be delivered. `None` when the handler replied itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl DispatchResult {
    /// Fallback result used when no handler could take the utterance.
    pub fn fallback(from: impl Into<String>, session_id: Option<SessionId>, body: String) -> Self {
        Self {
            handler: None,
            handler_uid: None,
            entry_point: None,
            body: Some(body),
            from: from.into(),
            session_id,
        }
    }
}
