//! Error types for Parley

use thiserror::Error;

use crate::message::VariantTag;

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while routing messages between agents
#[derive(Error, Debug)]
pub enum Error {
    #[error("Agent '{agent}' does not accept {variant} content")]
    UnsupportedContentVariant { agent: String, variant: VariantTag },

    #[error("Unrepresentable content: {0}")]
    UnrepresentableContent(String),

    #[error("Middleware '{name}' failed: {source}")]
    Middleware {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Turn limit of {max_turns} reached before the chat terminated")]
    TurnLimitExceeded { max_turns: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Attach the name of the chain stage a failure came from.
    ///
    /// Classified errors (variant, conversion, already-attributed, turn limit,
    /// cancellation) pass through unchanged so a failure is attributed once,
    /// at the stage closest to where it happened.
    pub fn attribute(self, name: &str) -> Self {
        match self {
            Error::UnsupportedContentVariant { .. }
            | Error::UnrepresentableContent(_)
            | Error::Middleware { .. }
            | Error::TurnLimitExceeded { .. }
            | Error::Cancelled => self,
            other => Error::Middleware {
                name: name.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Name of the stage a [`Error::Middleware`] failure is attributed to.
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            Error::Middleware { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_wraps_backend_errors_once() {
        let err = Error::Llm("timeout".to_string()).attribute("backend");
        assert_eq!(err.failed_stage(), Some("backend"));

        let err = err.attribute("printer");
        assert_eq!(err.failed_stage(), Some("backend"));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_attribute_keeps_classified_errors() {
        let err = Error::UnrepresentableContent("image".to_string()).attribute("connector");
        assert!(matches!(err, Error::UnrepresentableContent(_)));
    }
}
