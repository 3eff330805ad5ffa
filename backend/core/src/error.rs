use thiserror::Error;

/// Error type shared by the Lisa server crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The NLU collaborator answered with something unusable.
    #[error("NLU provider error ({provider}): {message}")]
    Nlu { provider: String, message: String },
}

impl CoreError {
    pub fn nlu(provider: &str, message: impl Into<String>) -> Self {
        Self::Nlu {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}
