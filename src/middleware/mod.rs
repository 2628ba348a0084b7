//! Middleware module — composable transforms chained around an agent.
//!
//! A middleware receives the inbound envelope and a [`Next`] continuation
//! standing for the rest of the chain (inner middleware plus the agent). It
//! must do one of:
//! - call `next` exactly once and return its (possibly rewritten) reply,
//! - return a synthesized reply without calling `next`,
//! - fail, which aborts the whole call.
//!
//! The engine attributes failures to the middleware that raised them and
//! never retries.
//!
//! # Built-in Middleware
//!
//! - [`ChatConnector`] — adapts generic variants to a structured-chat backend
//! - [`PrintMessageMiddleware`] — renders replies to the console
//! - [`FunctionCallMiddleware`] — executes function calls found in replies

mod connector;
mod function_call;
mod print;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::debug;

use crate::agent::{Agent, EnvelopeStream};
use crate::message::{Envelope, VariantSet};
use crate::Result;

pub use connector::ChatConnector;
pub use function_call::{FunctionCallMiddleware, TOOLS_KEY};
pub use print::PrintMessageMiddleware;

/// Middleware trait — one stage of an agent's chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used for diagnostics and failure attribution.
    fn name(&self) -> &str;

    /// Variants this middleware actively converts into something the
    /// inner chain accepts. Everything else passes through untouched.
    fn handles(&self) -> VariantSet {
        VariantSet::empty()
    }

    async fn invoke(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope>;

    /// Streaming counterpart of [`Middleware::invoke`]; forwards by default.
    async fn invoke_streaming(&self, envelope: Envelope, next: Next<'_>) -> Result<EnvelopeStream> {
        next.run_streaming(envelope).await
    }
}

/// Continuation: the remaining middleware (outermost last) and the agent.
///
/// `run` and `run_streaming` consume the continuation, so a stage can call
/// the rest of its chain at most once:
///
/// ```compile_fail
/// use parley::message::Envelope;
/// use parley::middleware::Next;
///
/// fn twice(next: Next<'_>, envelope: Envelope) {
///     let _first = next.run(envelope.clone());
///     let _second = next.run(envelope);
/// }
/// ```
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    agent: &'a dyn Agent,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], agent: &'a dyn Agent) -> Self {
        Self { chain, agent }
    }

    /// Run the rest of the chain.
    pub async fn run(self, envelope: Envelope) -> Result<Envelope> {
        match self.chain.split_last() {
            Some((outer, rest)) => {
                debug!(middleware = outer.name(), variant = %envelope.variant(), "invoke");
                outer
                    .invoke(envelope, Next::new(rest, self.agent))
                    .await
                    .map_err(|e| e.attribute(outer.name()))
            }
            None => self.agent.send(envelope).await,
        }
    }

    /// Run the rest of the chain in streaming mode.
    pub async fn run_streaming(self, envelope: Envelope) -> Result<EnvelopeStream> {
        match self.chain.split_last() {
            Some((outer, rest)) => {
                debug!(middleware = outer.name(), variant = %envelope.variant(), "invoke_streaming");
                outer
                    .invoke_streaming(envelope, Next::new(rest, self.agent))
                    .await
                    .map_err(|e| e.attribute(outer.name()))
            }
            None => self.agent.send_streaming(envelope).await,
        }
    }

    /// Name of the agent at the end of the chain.
    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }
}

type MiddlewareFn = dyn for<'a> Fn(Envelope, Next<'a>) -> BoxFuture<'a, Result<Envelope>> + Send + Sync;

/// Middleware built from a closure.
///
/// # Example
///
/// ```ignore
/// let logger = FnMiddleware::new("logger", |envelope, next| {
///     Box::pin(async move {
///         tracing::info!("inbound: {}", envelope.text_content());
///         next.run(envelope).await
///     })
/// });
/// ```
pub struct FnMiddleware {
    name: String,
    handler: Box<MiddlewareFn>,
}

impl FnMiddleware {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(Envelope, Next<'a>) -> BoxFuture<'a, Result<Envelope>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl Middleware for FnMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope> {
        (self.handler)(envelope, next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeBackend;
    use crate::agent::{AgentExt, ChatAgent};
    use crate::error::Error;
    use crate::message::{ChatMessage, TextMessage};
    use std::sync::Mutex;

    /// Records the order it sees traffic in.
    struct Recorder {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn invoke(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope> {
            self.log.lock().unwrap().push(format!("{}:in", self.name));
            let reply = next.run(envelope).await?;
            self.log.lock().unwrap().push(format!("{}:out", self.name));
            Ok(reply)
        }
    }

    struct Failing;

    #[async_trait]
    impl Middleware for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn invoke(&self, _envelope: Envelope, _next: Next<'_>) -> Result<Envelope> {
            Err(Error::Other("boom".to_string()))
        }
    }

    fn chat_envelope() -> Envelope {
        Envelope::wrap(ChatMessage::user("hi"), "user")
    }

    #[tokio::test]
    async fn test_registration_order_is_preserved() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let backend = Arc::new(FakeBackend::new(vec!["hello"]));
        let agent = ChatAgent::new("assistant", backend.clone())
            .register_middleware(Recorder { name: "m1".into(), log: log.clone() })
            .register_middleware(Recorder { name: "m2".into(), log: log.clone() });

        assert_eq!(agent.middleware_names(), vec!["m1", "m2"]);
        agent.send(chat_envelope()).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["m2:in", "m1:in", "m1:out", "m2:out"]
        );
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_backend() {
        let backend = Arc::new(FakeBackend::new(vec!["never seen"]));
        let canned = FnMiddleware::new("canned", |envelope, _next| {
            Box::pin(async move {
                Ok::<_, Error>(Envelope::reply_to(
                    &envelope,
                    TextMessage::assistant("canned"),
                    "assistant",
                ))
            })
        });
        let agent = ChatAgent::new("assistant", backend.clone()).register_middleware(canned);

        let reply = agent.send(chat_envelope()).await.unwrap();

        assert_eq!(reply.text_content(), "canned");
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_middleware_failure_is_attributed() {
        let backend = Arc::new(FakeBackend::new(vec!["never seen"]));
        let log = Arc::new(Mutex::new(Vec::new()));
        let agent = ChatAgent::new("assistant", backend.clone())
            .register_middleware(Failing)
            .register_middleware(Recorder { name: "outer".into(), log: log.clone() });

        let err = agent.send(chat_envelope()).await.unwrap_err();

        assert_eq!(err.failed_stage(), Some("failing"));
        assert_eq!(backend.calls(), 0);
        assert_eq!(*log.lock().unwrap(), vec!["outer:in"]);
    }

    #[tokio::test]
    async fn test_backend_failure_is_attributed_to_agent() {
        let backend = Arc::new(FakeBackend::failing("timeout"));
        let log = Arc::new(Mutex::new(Vec::new()));
        let agent = ChatAgent::new("assistant", backend)
            .register_middleware(Recorder { name: "m1".into(), log });

        let err = agent.send(chat_envelope()).await.unwrap_err();

        assert_eq!(err.failed_stage(), Some("assistant"));
        assert!(err.to_string().contains("timeout"));
    }
}
