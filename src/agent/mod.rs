//! Agent module — the addressable participants of a conversation.
//!
//! This module contains:
//! - The [`Agent`] trait: receive one envelope, produce one reply envelope
//! - [`MiddlewareAgent`], an agent wrapped in an ordered middleware chain
//! - [`ChatAgent`], backed by an [`LlmBackend`]
//! - [`UserProxyAgent`], a human in the loop
//!
//! # Adding a New Agent
//!
//! Implement [`Agent::name`], [`Agent::accepts`] and [`Agent::generate_reply`].
//! Callers go through [`Agent::send`], which checks the inbound variant and
//! stamps the reply with the agent's name.

mod chat_agent;
mod middleware_agent;
mod user_proxy;

pub mod llm;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use crate::chat::{ChatOrchestrator, ChatOutcome};
use crate::error::Error;
use crate::message::{convert, ChatChunk, Content, Envelope, VariantSet, VariantTag};
use crate::middleware::Middleware;
use crate::Result;

pub use chat_agent::ChatAgent;
pub use llm::{ChatRequest, GeminiBackend, LlmBackend, ProviderRegistry};
pub use middleware_agent::MiddlewareAgent;
pub use user_proxy::{ConsoleInput, HumanInput, HumanInputMode, ScriptedInput, UserProxyAgent};

/// A lazy, finite sequence of partial reply envelopes.
pub type EnvelopeStream = BoxStream<'static, Result<Envelope>>;

/// Agent trait — uniform dispatch contract for every participant.
///
/// Agents hold no per-call mutable state and can be shared between
/// concurrent conversations.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Name, unique within a conversation.
    fn name(&self) -> &str;

    /// Content variants this agent accepts.
    fn accepts(&self) -> VariantSet;

    /// Produce the reply to an envelope already known to be accepted.
    async fn generate_reply(&self, envelope: Envelope) -> Result<Envelope>;

    /// Streaming variant of [`Agent::generate_reply`].
    ///
    /// Agents whose backend cannot stream yield their full reply as the only item.
    async fn generate_streaming(&self, envelope: Envelope) -> Result<EnvelopeStream> {
        let reply = self.generate_reply(envelope).await?;
        Ok(stream::iter([Ok(reply)]).boxed())
    }

    /// Fail with [`Error::UnsupportedContentVariant`] unless the variant is accepted.
    fn ensure_accepts(&self, envelope: &Envelope) -> Result<()> {
        let variant = envelope.variant();
        if self.accepts().contains(variant) {
            Ok(())
        } else {
            Err(Error::UnsupportedContentVariant {
                agent: self.name().to_string(),
                variant,
            })
        }
    }

    /// Send an envelope and await exactly one reply authored by this agent.
    async fn send(&self, envelope: Envelope) -> Result<Envelope> {
        self.ensure_accepts(&envelope)?;
        debug!(agent = self.name(), variant = %envelope.variant(), "send");

        let reply = self
            .generate_reply(envelope)
            .await
            .map_err(|e| e.attribute(self.name()))?;
        Ok(authored_by(reply, self.name()))
    }

    /// Send an envelope and receive the reply as a stream of partial envelopes.
    async fn send_streaming(&self, envelope: Envelope) -> Result<EnvelopeStream> {
        self.ensure_accepts(&envelope)?;
        debug!(agent = self.name(), variant = %envelope.variant(), "send_streaming");

        let name = self.name().to_string();
        let replies = self
            .generate_streaming(envelope)
            .await
            .map_err(|e| e.attribute(&name))?;
        Ok(replies
            .map(move |item| match item {
                Ok(reply) => Ok(authored_by(reply, &name)),
                Err(e) => Err(e.attribute(&name)),
            })
            .boxed())
    }
}

#[async_trait]
impl<T: Agent + ?Sized> Agent for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn accepts(&self) -> VariantSet {
        (**self).accepts()
    }

    async fn generate_reply(&self, envelope: Envelope) -> Result<Envelope> {
        (**self).generate_reply(envelope).await
    }

    async fn generate_streaming(&self, envelope: Envelope) -> Result<EnvelopeStream> {
        (**self).generate_streaming(envelope).await
    }
}

/// Convenience methods available on every agent.
pub trait AgentExt: Agent + Sized + 'static {
    /// Wrap this agent in a middleware chain whose first entry is `middleware`.
    fn register_middleware(self, middleware: impl Middleware + 'static) -> MiddlewareAgent {
        MiddlewareAgent::new(self).register_middleware(middleware)
    }

    /// Open a two-party chat with `receiver`, starting from `opening`.
    fn initiate_chat(
        self,
        receiver: Arc<dyn Agent>,
        opening: &str,
        max_turns: usize,
    ) -> impl Future<Output = Result<ChatOutcome>> + Send {
        let opening = ChatOrchestrator::opening_for(receiver.as_ref(), opening, self.name());
        let initiator: Arc<dyn Agent> = Arc::new(self);
        async move {
            ChatOrchestrator::new(initiator, receiver)
                .with_max_turns(max_turns)
                .run(opening)
                .await
        }
    }
}

impl<A: Agent + 'static> AgentExt for A {}

/// Drain a streamed reply into one envelope equivalent to the full reply.
///
/// A stream of a single complete envelope yields that envelope unchanged.
/// Otherwise the items are merged into one structured chat message, which is
/// then converted to the variant named by [`convert::REPLY_VARIANT_KEY`] when
/// a connector tagged the chunks with one. The result keeps the first item's
/// id, sender and parent, and the metadata of every item.
pub async fn collect_stream(mut replies: EnvelopeStream) -> Result<Envelope> {
    let mut items = Vec::new();
    while let Some(item) = replies.next().await {
        items.push(item?);
    }

    let first = match items.first() {
        Some(first) => first.clone(),
        None => return Err(Error::Llm("stream ended without a reply".to_string())),
    };
    if items.len() == 1 && !matches!(first.content(), Content::Chunk(_)) {
        return Ok(first);
    }

    let chunks = items
        .iter()
        .map(|env| match env.content() {
            Content::Chunk(chunk) => Ok(chunk.clone()),
            other => convert::to_chat(other, true).map(|m| ChatChunk {
                role: Some(m.role),
                items: m.items,
            }),
        })
        .collect::<Result<Vec<_>>>()?;
    let merged = convert::merge_chunks(&chunks);

    let target = items
        .iter()
        .find_map(|env| env.metadata().get(convert::REPLY_VARIANT_KEY))
        .map(|value| serde_json::from_value::<VariantTag>(value.clone()))
        .transpose()?;
    let adapted = match target {
        Some(target) => convert::from_chat(merged, target),
        None => convert::Adapted {
            content: Content::Chat(merged),
            auxiliary: Default::default(),
        },
    };

    let mut reply = first.with_content(adapted.content);
    for (key, value) in items.iter().skip(1).flat_map(|env| env.metadata()) {
        reply = reply.with_metadata(key.clone(), value.clone());
    }
    for (key, value) in adapted.auxiliary {
        reply = reply.with_metadata(key, value);
    }
    Ok(reply.without_metadata(convert::REPLY_VARIANT_KEY))
}

fn authored_by(reply: Envelope, name: &str) -> Envelope {
    if reply.sender() == name {
        return reply;
    }
    warn!(agent = name, sender = reply.sender(), "re-attributing reply to agent");
    reply.reattribute(name)
}
