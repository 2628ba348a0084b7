//! An agent wrapped in an ordered middleware chain.

use std::sync::Arc;

use async_trait::async_trait;

use crate::message::{Envelope, VariantSet};
use crate::middleware::{Middleware, Next};
use crate::Result;

use super::{Agent, EnvelopeStream};

/// Value type holding an inner agent and the middleware registered on it.
///
/// Registering returns a new value that shares the inner agent; existing
/// values are never modified, so the same agent can sit behind different
/// chains in different conversations.
#[derive(Clone)]
pub struct MiddlewareAgent {
    inner: Arc<dyn Agent>,
    /// Registration order; the last entry is the outermost.
    middlewares: Arc<[Arc<dyn Middleware>]>,
}

impl MiddlewareAgent {
    /// Wrap an agent with an empty chain.
    pub fn new(inner: impl Agent + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
            middlewares: Arc::from(Vec::new()),
        }
    }

    /// Return a new agent with `middleware` added as the outermost stage.
    pub fn register_middleware(self, middleware: impl Middleware + 'static) -> Self {
        let mut chain: Vec<Arc<dyn Middleware>> = self.middlewares.iter().cloned().collect();
        chain.push(Arc::new(middleware));
        Self {
            inner: self.inner,
            middlewares: chain.into(),
        }
    }

    /// Registered middleware names, innermost first.
    pub fn middleware_names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    /// The wrapped agent.
    pub fn inner(&self) -> &Arc<dyn Agent> {
        &self.inner
    }
}

#[async_trait]
impl Agent for MiddlewareAgent {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn accepts(&self) -> VariantSet {
        self.middlewares
            .iter()
            .fold(self.inner.accepts(), |set, m| set.union(m.handles()))
    }

    async fn generate_reply(&self, envelope: Envelope) -> Result<Envelope> {
        Next::new(&self.middlewares, self.inner.as_ref()).run(envelope).await
    }

    async fn generate_streaming(&self, envelope: Envelope) -> Result<EnvelopeStream> {
        Next::new(&self.middlewares, self.inner.as_ref())
            .run_streaming(envelope)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeBackend;
    use crate::agent::{AgentExt, ChatAgent};
    use crate::message::VariantTag;
    use crate::middleware::{ChatConnector, PrintMessageMiddleware};

    #[test]
    fn test_registration_returns_new_value() {
        let backend = Arc::new(FakeBackend::new(vec![]));
        let base = MiddlewareAgent::new(ChatAgent::new("assistant", backend));
        let with_connector = base.clone().register_middleware(ChatConnector::new());

        assert!(base.middleware_names().is_empty());
        assert_eq!(with_connector.middleware_names(), vec!["chat-connector"]);
        assert!(Arc::ptr_eq(base.inner(), with_connector.inner()));
    }

    #[test]
    fn test_accepts_grows_with_connector() {
        let backend = Arc::new(FakeBackend::new(vec![]));
        let agent = ChatAgent::new("assistant", backend);
        assert!(!agent.accepts().contains(VariantTag::Text));

        let agent = agent
            .register_middleware(ChatConnector::new())
            .register_middleware(PrintMessageMiddleware::new());
        assert!(agent.accepts().contains(VariantTag::Text));
        assert!(agent.accepts().contains(VariantTag::MultiModal));
        assert_eq!(agent.name(), "assistant");
    }
}
