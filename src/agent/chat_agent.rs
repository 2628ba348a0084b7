//! Chat agent — an agent backed by an LLM.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::error::Error;
use crate::message::{ChatChunk, Content, Envelope, VariantSet, VariantTag};
use crate::middleware::TOOLS_KEY;
use crate::tools::ToolDefinition;
use crate::Result;

use super::llm::{ChatRequest, LlmBackend};
use super::{Agent, EnvelopeStream};

/// Agent whose replies come from an [`LlmBackend`].
///
/// It natively accepts structured chat only; register a
/// [`ChatConnector`](crate::middleware::ChatConnector) to talk to it in
/// other variants.
#[derive(Clone)]
pub struct ChatAgent {
    name: String,
    system_message: Option<String>,
    tools: Vec<ToolDefinition>,
    backend: Arc<dyn LlmBackend>,
}

impl ChatAgent {
    pub fn new(name: impl Into<String>, backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            name: name.into(),
            system_message: None,
            tools: Vec::new(),
            backend,
        }
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    /// Functions always offered to the backend.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn backend(&self) -> &Arc<dyn LlmBackend> {
        &self.backend
    }

    fn build_request(&self, envelope: &Envelope) -> Result<ChatRequest> {
        let message = match envelope.content() {
            Content::Chat(message) => message.clone(),
            other => {
                return Err(Error::UnsupportedContentVariant {
                    agent: self.name.clone(),
                    variant: other.variant(),
                })
            }
        };

        // Functions advertised by middleware ride along in metadata.
        let mut tools = self.tools.clone();
        if let Some(advertised) = envelope.metadata().get(TOOLS_KEY) {
            let advertised: Vec<ToolDefinition> = serde_json::from_value(advertised.clone())?;
            for tool in advertised {
                if !tools.iter().any(|t| t.name == tool.name) {
                    tools.push(tool);
                }
            }
        }

        Ok(ChatRequest {
            system: self.system_message.clone(),
            messages: vec![message],
            tools,
        })
    }
}

#[async_trait]
impl Agent for ChatAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self) -> VariantSet {
        VariantSet::of(&[VariantTag::Chat])
    }

    async fn generate_reply(&self, envelope: Envelope) -> Result<Envelope> {
        let request = self.build_request(&envelope)?;
        debug!(
            agent = %self.name,
            model = self.backend.model(),
            tools = request.tools.len(),
            "calling backend"
        );

        let reply = self.backend.complete(&request).await?;
        info!(agent = %self.name, "backend replied with {} items", reply.items.len());
        Ok(Envelope::reply_to(&envelope, reply, &self.name))
    }

    async fn generate_streaming(&self, envelope: Envelope) -> Result<EnvelopeStream> {
        let request = self.build_request(&envelope)?;
        let parent = envelope.id();
        let name = self.name.clone();

        match self.backend.complete_streaming(&request).await? {
            Some(chunks) => Ok(chunks
                .map(move |chunk| chunk.map(|c| Envelope::wrap(c, name.clone()).with_parent(parent)))
                .boxed()),
            None => {
                debug!(agent = %self.name, "backend cannot stream, replying in one chunk");
                let reply = self.backend.complete(&request).await?;
                let chunk = ChatChunk {
                    role: Some(reply.role),
                    items: reply.items,
                };
                let envelope = Envelope::wrap(chunk, name).with_parent(parent);
                Ok(stream::iter([Ok(envelope)]).boxed())
            }
        }
    }
}
