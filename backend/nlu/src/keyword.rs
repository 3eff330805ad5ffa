/// Keyword matcher: a local, offline NLU collaborator.
///
/// Each intent has trigger phrases. A message equal to a phrase decodes
/// with full confidence, a message merely containing one with reduced
/// confidence; the longest matching phrase wins.
use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lisa_core::{NluClient, Outcome};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

const EXACT_CONFIDENCE: f64 = 1.0;
const PARTIAL_CONFIDENCE: f64 = 0.75;

struct Trigger {
    intent: String,
    phrase: String,
    pattern: Regex,
}

pub struct KeywordNlu {
    triggers: Vec<Trigger>,
}

impl KeywordNlu {
    pub fn new(table: &HashMap<String, Vec<String>>) -> Result<Self> {
        let mut triggers = Vec::new();
        for (intent, phrases) in table {
            for phrase in phrases {
                let phrase = normalize(phrase);
                if phrase.is_empty() {
                    continue;
                }
                let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(&phrase)))
                    .with_context(|| format!("Invalid keyword '{phrase}' for intent '{intent}'"))?;
                triggers.push(Trigger {
                    intent: intent.clone(),
                    phrase,
                    pattern,
                });
            }
        }
        // Longest phrase first, then intent name for a stable order.
        triggers.sort_by(|a, b| {
            b.phrase
                .len()
                .cmp(&a.phrase.len())
                .then_with(|| a.intent.cmp(&b.intent))
        });
        Ok(Self { triggers })
    }

    fn match_text(&self, text: &str) -> Outcome {
        let text = normalize(text);
        for trigger in &self.triggers {
            if trigger.phrase == text {
                return Outcome::new(&trigger.intent, EXACT_CONFIDENCE);
            }
        }
        self.triggers
            .iter()
            .find(|t| t.pattern.is_match(&text))
            .map(|t| Outcome::new(&t.intent, PARTIAL_CONFIDENCE))
            .unwrap_or_else(|| Outcome {
                confidence: Some(0.0),
                ..Outcome::default()
            })
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl NluClient for KeywordNlu {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn decode(&self, text: &str, context: Option<&Value>) -> Result<Outcome> {
        let outcome = self.match_text(text);
        debug!(intent = ?outcome.intent, has_context = context.is_some(), "Keyword match");
        Ok(outcome)
    }
}
