//! Config redaction: masks secrets before the effective config is logged.

use serde_json::Value;

const SENSITIVE_KEYS: &[&str] = &["token", "apiKey", "secret", "password", "key"];

/// Redact a config value tree, replacing sensitive string leaves with `"***"`.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let masked = match v {
                        Value::String(s) if is_sensitive(k) && !s.is_empty() => {
                            Value::String("***".into())
                        }
                        other => redact(other),
                    };
                    (k.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}
