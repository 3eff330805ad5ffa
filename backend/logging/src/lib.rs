//! Structured logging for the Lisa server.
//!
//! Console + rolling NDJSON file output, secret redaction, and the dialog
//! audit event logger.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{DialogEvent, DialogEventLogger, EventLogEntry};
pub use logger::{LOG_FILE_PREFIX, init_logger};
pub use tracing_appender::non_blocking::WorkerGuard;
pub use redact::redact_sensitive_data;
