//! Log Redaction Layer
//!
//! Scrubs bearer tokens, NLU access tokens, and phone numbers before logging.

use regex::Regex;
use std::sync::LazyLock;

static TELEPHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap()
});
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)|("?(?:token|access_token)"?\s*[:=]\s*"?[A-Za-z0-9\-_]{8,}"?)"#)
        .unwrap()
});

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = TELEPHONE_RE.replace_all(input, "[REDACTED_PHONE]");
    TOKEN_RE.replace_all(&redacted, "[REDACTED_TOKEN]").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_phone_and_bearer() {
        let raw = "Call +1-555-123-4567, auth Bearer eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("+1-555-123-4567"));
        assert!(!clean.contains("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9"));
    }

    #[test]
    fn test_redacts_token_fields() {
        let clean = redact_sensitive_data(r#"{"token": "ABCDEFGH12345678"}"#);
        assert!(!clean.contains("ABCDEFGH12345678"));
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(redact_sensitive_data("turn off the lights"), "turn off the lights");
    }
}
