use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialogError {
    #[error("unknown handler '{0}'")]
    UnknownHandler(String),

    #[error("handler '{handler}' has no entry point '{entry_point}'")]
    UnknownEntryPoint { handler: String, entry_point: String },

    #[error("handler '{handler}' failed: {source}")]
    HandlerFault {
        handler: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DialogError {
    /// Catalog key of the notice sent to the session.
    pub fn notice_key(&self) -> &'static str {
        match self {
            Self::UnknownHandler(_) => "error_intent_unknown",
            Self::UnknownEntryPoint { .. } => "error_handler_no_entry",
            Self::HandlerFault { .. } => "error_handler_exec",
        }
    }
}
