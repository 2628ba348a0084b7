//! Predicates deciding when a chat is over.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::message::Envelope;

/// Keyword that ends a chat unless configured otherwise.
pub const DEFAULT_TERMINATION_KEYWORD: &str = "TERMINATE";

type Predicate = dyn Fn(&Envelope) -> bool + Send + Sync;

/// Termination check the orchestrator applies to every reply.
#[derive(Clone)]
pub enum Termination {
    /// Reply text contains the keyword.
    Keyword(String),
    /// Reply text matches the pattern.
    Pattern(Regex),
    /// Arbitrary predicate over the reply.
    Custom(Arc<Predicate>),
    /// Only the turn limit ends the chat.
    Never,
}

impl Termination {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Termination::Keyword(keyword.into())
    }

    pub fn pattern(pattern: &str) -> crate::Result<Self> {
        Regex::new(pattern)
            .map(Termination::Pattern)
            .map_err(|e| crate::Error::Config(format!("Invalid termination pattern: {e}")))
    }

    pub fn custom(predicate: impl Fn(&Envelope) -> bool + Send + Sync + 'static) -> Self {
        Termination::Custom(Arc::new(predicate))
    }

    pub fn is_met(&self, reply: &Envelope) -> bool {
        match self {
            Termination::Keyword(keyword) => reply.text_content().contains(keyword.as_str()),
            Termination::Pattern(regex) => regex.is_match(&reply.text_content()),
            Termination::Custom(predicate) => predicate(reply),
            Termination::Never => false,
        }
    }
}

impl Default for Termination {
    fn default() -> Self {
        Termination::keyword(DEFAULT_TERMINATION_KEYWORD)
    }
}

impl fmt::Debug for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Keyword(k) => f.debug_tuple("Keyword").field(k).finish(),
            Termination::Pattern(r) => f.debug_tuple("Pattern").field(&r.as_str()).finish(),
            Termination::Custom(_) => f.write_str("Custom(..)"),
            Termination::Never => f.write_str("Never"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_termination() {
        let term = Termination::default();
        assert!(term.is_met(&Envelope::text("All done. TERMINATE", "assistant")));
        assert!(!term.is_met(&Envelope::text("terminate later", "assistant")));
    }

    #[test]
    fn test_pattern_termination() {
        let term = Termination::pattern(r"(?i)\bbye\b").unwrap();
        assert!(term.is_met(&Envelope::text("Ok, Bye!", "user")));
        assert!(!term.is_met(&Envelope::text("goodbyes", "user")));
        assert!(Termination::pattern("(").is_err());
    }

    #[test]
    fn test_custom_and_never() {
        let term = Termination::custom(|env| env.sender() == "user");
        assert!(term.is_met(&Envelope::text("x", "user")));
        assert!(!Termination::Never.is_met(&Envelope::text("TERMINATE", "user")));
    }
}
