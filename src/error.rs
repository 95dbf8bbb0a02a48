//! Error types for the conversation pipeline.
//!
//! Storage, configuration, and CLI plumbing use `anyhow`. The orchestrator
//! surface returns [`ChatError`] so callers can tell a rejected request apart
//! from a failed collaborator.

use thiserror::Error;

/// Failure categories for a single chat request.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The request itself is malformed (empty token, empty message, ...).
    #[error("invalid request: {0}")]
    Validation(String),

    /// The completion gateway failed. The user message is already persisted.
    #[error("completion gateway error: {0}")]
    Gateway(String),

    /// The persistence layer failed. Earlier writes in the same call stand.
    #[error("persistence error: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl ChatError {
    /// Short machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "bad_request",
            ChatError::Gateway(_) => "gateway_error",
            ChatError::Persistence(_) => "internal",
        }
    }
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_distinguish_categories() {
        assert_eq!(ChatError::Validation("x".into()).code(), "bad_request");
        assert_eq!(ChatError::Gateway("x".into()).code(), "gateway_error");
        assert_eq!(
            ChatError::Persistence(anyhow::anyhow!("disk full")).code(),
            "internal"
        );
    }

    #[test]
    fn test_persistence_message_includes_cause() {
        let err = ChatError::Persistence(anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "persistence error: disk full");
    }
}
