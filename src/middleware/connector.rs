//! Connector middleware — lets a structured-chat agent speak every variant.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use tracing::debug;

use crate::agent::EnvelopeStream;
use crate::message::convert;
use crate::message::{Content, Envelope, VariantSet, VariantTag};
use crate::Result;

use super::{Middleware, Next};

/// Adapts inbound plain text, multi-modal and chunk envelopes to structured
/// chat, and converts the reply back toward the variant the caller used.
///
/// Register it innermost of any middleware that inspects reply content, so
/// those see the adapted shape.
#[derive(Debug, Clone)]
pub struct ChatConnector {
    allow_images: bool,
}

impl ChatConnector {
    /// Connector for a backend that accepts images.
    pub fn new() -> Self {
        Self { allow_images: true }
    }

    /// Connector for a text-only backend; image content fails as unrepresentable.
    pub fn text_only() -> Self {
        Self { allow_images: false }
    }

    fn adapt_inbound(&self, envelope: Envelope) -> Result<Envelope> {
        let chat = convert::to_chat(envelope.content(), self.allow_images)?;
        Ok(envelope.with_content(chat))
    }
}

impl Default for ChatConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert `reply` toward `target`, keeping set-aside items as metadata.
fn adapt_reply(reply: Envelope, target: VariantTag) -> Result<Envelope> {
    if reply.variant() == target || target == VariantTag::Chat {
        return Ok(reply);
    }

    let chat = match reply.content() {
        Content::Chat(message) => message.clone(),
        other => convert::to_chat(other, true)?,
    };
    let adapted = convert::from_chat(chat, target);
    debug!(
        from = %reply.variant(),
        to = %adapted.content.variant(),
        auxiliary = adapted.auxiliary.len(),
        "adapting reply"
    );

    let mut reply = reply.with_content(adapted.content);
    for (key, value) in adapted.auxiliary {
        reply = reply.with_metadata(key, value);
    }
    Ok(reply)
}

#[async_trait]
impl Middleware for ChatConnector {
    fn name(&self) -> &str {
        "chat-connector"
    }

    fn handles(&self) -> VariantSet {
        VariantSet::of(&[VariantTag::Text, VariantTag::Chunk, VariantTag::MultiModal])
    }

    async fn invoke(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope> {
        let target = envelope.variant();
        let reply = next.run(self.adapt_inbound(envelope)?).await?;
        adapt_reply(reply, target)
    }

    async fn invoke_streaming(&self, envelope: Envelope, next: Next<'_>) -> Result<EnvelopeStream> {
        let target = envelope.variant();
        let replies = next.run_streaming(self.adapt_inbound(envelope)?).await?;

        // Partial chunks stay chunks, tagged so `collect_stream` can finish
        // them in the caller's variant; complete replies are adapted like `invoke`.
        Ok(replies
            .map(move |item| {
                let reply = item?;
                match reply.content() {
                    Content::Chunk(_) => Ok(reply.with_metadata(convert::REPLY_VARIANT_KEY, json!(target))),
                    _ => adapt_reply(reply, target),
                }
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeBackend;
    use crate::agent::{collect_stream, Agent, AgentExt, ChatAgent};
    use crate::error::Error;
    use crate::message::convert::TOOL_CALLS_KEY;
    use crate::message::{
        ChatChunk, ChatItem, ChatMessage, FunctionCall, ImageSource, MultiModalMessage, Part, Role,
        TextMessage,
    };
    use std::sync::Arc;

    fn light_agent(backend: Arc<FakeBackend>) -> impl Agent {
        ChatAgent::new("assistant", backend)
            .with_system_message("You control the light")
            .register_middleware(ChatConnector::new())
    }

    #[tokio::test]
    async fn test_plain_text_in_plain_text_out() {
        let backend = Arc::new(FakeBackend::new(vec!["[Light is now on]"]));
        let agent = light_agent(backend.clone());

        let reply = agent.send(Envelope::text("Toggle the light", "user")).await.unwrap();

        assert_eq!(reply.as_text(), Some(&TextMessage::assistant("[Light is now on]")));
        assert_eq!(backend.requests()[0].messages, vec![ChatMessage::user("Toggle the light")]);
    }

    #[tokio::test]
    async fn test_structured_chat_passes_through() {
        let backend = Arc::new(FakeBackend::new(vec!["done"]));
        let agent = light_agent(backend);

        let reply = agent
            .send(Envelope::wrap(ChatMessage::user("Toggle the light"), "user"))
            .await
            .unwrap();

        assert_eq!(reply.variant(), VariantTag::Chat);
    }

    #[tokio::test]
    async fn test_tool_calls_survive_as_metadata() {
        let backend = Arc::new(FakeBackend::with_messages(vec![ChatMessage::assistant("On it.")
            .with_item(ChatItem::FunctionCall(FunctionCall {
                id: "tc_0".to_string(),
                name: "change_state".to_string(),
                arguments: json!({"new_state": true}),
            }))]));
        let agent = light_agent(backend);

        let reply = agent.send(Envelope::text("Toggle the light", "user")).await.unwrap();

        assert_eq!(reply.text_content(), "On it.");
        assert_eq!(reply.metadata()[TOOL_CALLS_KEY][0]["name"], "change_state");
    }

    #[tokio::test]
    async fn test_multi_modal_round_trip() {
        let backend = Arc::new(FakeBackend::new(vec!["a cat"]));
        let agent = light_agent(backend.clone());
        let image = ImageSource::from_bytes("image/png", b"png");
        let inbound = Envelope::wrap(
            MultiModalMessage::new(
                Role::User,
                vec![Part::Text { text: "what is this?".to_string() }, Part::Image { source: image.clone() }],
            ),
            "user",
        );

        let reply = agent.send(inbound).await.unwrap();

        assert_eq!(reply.variant(), VariantTag::MultiModal);
        assert_eq!(reply.text_content(), "a cat");
        assert!(backend.requests()[0].messages[0].has_images());
    }

    #[tokio::test]
    async fn test_text_only_backend_rejects_images() {
        let backend = Arc::new(FakeBackend::new(vec!["never"]));
        let agent = ChatAgent::new("assistant", backend.clone())
            .register_middleware(ChatConnector::text_only());
        let inbound = Envelope::wrap(
            MultiModalMessage::new(
                Role::User,
                vec![Part::Image { source: ImageSource::from_bytes("image/png", b"png") }],
            ),
            "user",
        );

        let err = agent.send(inbound).await.unwrap_err();

        assert!(matches!(err, Error::UnrepresentableContent(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_streaming_through_connector() {
        let backend = Arc::new(FakeBackend::new(vec!["[Light is now on]"]).chunked());
        let agent = light_agent(backend);

        let stream = agent.send_streaming(Envelope::text("Toggle the light", "user")).await.unwrap();
        let reply = collect_stream(stream).await.unwrap();

        assert_eq!(reply.text_content(), "[Light is now on]");
    }

    #[tokio::test]
    async fn test_streamed_reply_matches_sent_reply() {
        let backend = Arc::new(FakeBackend::new(vec!["[Light is now on]", "[Light is now on]"]).chunked());
        let agent = light_agent(backend);

        let first = Envelope::text("Toggle the light", "user");
        let second = Envelope::text("Toggle the light", "user");
        let sent = agent.send(first.clone()).await.unwrap();
        let stream = agent.send_streaming(second.clone()).await.unwrap();
        let streamed = collect_stream(stream).await.unwrap();

        assert_eq!(streamed.variant(), VariantTag::Text);
        assert_eq!(streamed.variant(), sent.variant());
        assert_eq!(streamed.content(), sent.content());
        assert_eq!(streamed.sender(), sent.sender());
        assert_eq!(sent.parent(), Some(first.id()));
        assert_eq!(streamed.parent(), Some(second.id()));
        assert!(!streamed.metadata().contains_key(convert::REPLY_VARIANT_KEY));
    }

    #[tokio::test]
    async fn test_chunk_caller_gets_chunk_reply() {
        let backend = Arc::new(FakeBackend::new(vec!["[Light is now on]"]));
        let agent = light_agent(backend.clone());
        let inbound = Envelope::wrap(ChatChunk::text("Toggle the light").with_role(Role::User), "user");

        let reply = agent.send(inbound).await.unwrap();

        assert_eq!(reply.variant(), VariantTag::Chunk);
        assert_eq!(reply.content().role(), Some(Role::Assistant));
        assert_eq!(reply.text_content(), "[Light is now on]");
        assert_eq!(backend.requests()[0].messages, vec![ChatMessage::user("Toggle the light")]);
    }
}
