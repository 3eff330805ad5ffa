//! Dialog Event Logger
//!
//! Audit events for frames and dialog steps, emitted under the
//! `dialog_events` target so they land in the NDJSON file.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogEvent {
    Inbound { frame: String },
    Outbound { frame: String },
    Step { step_id: u64, kind: String },
    Error { error_msg: String },
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub session: String,
    pub timestamp: DateTime<Utc>,
    pub event: DialogEvent,
}

pub struct DialogEventLogger;

impl DialogEventLogger {
    /// Redact and emit one event.
    pub fn log_event(session: &str, event: DialogEvent) {
        let entry = Self::entry(session, event);
        info!(target: "dialog_events", event = ?entry, "Dialog event");
    }

    fn entry(session: &str, mut event: DialogEvent) -> EventLogEntry {
        match &mut event {
            DialogEvent::Inbound { frame } | DialogEvent::Outbound { frame } => {
                *frame = redact_sensitive_data(frame);
            }
            DialogEvent::Error { error_msg } => {
                *error_msg = redact_sensitive_data(error_msg);
            }
            DialogEvent::Step { .. } => {}
        }
        EventLogEntry {
            session: session.into(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_redacts_frames() {
        let entry = DialogEventLogger::entry(
            "kitchen",
            DialogEvent::Inbound { frame: "call me at 555-123-4567".into() },
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event"]["type"], "inbound");
        assert!(!json["event"]["frame"].as_str().unwrap().contains("555-123-4567"));
    }
}
