//! LLM backend abstraction layer.
//!
//! This module provides:
//! - [`LlmBackend`] trait for swappable chat-completion providers
//! - [`ProviderRegistry`] for creating a backend from configuration
//! - Concrete implementation: Gemini API key
//!
//! The agent core only ever sees [`ChatRequest`] and [`ChatMessage`]; wire
//! formats stay inside each provider.
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `openai.rs`)
//! 2. Implement `LlmBackend` trait
//! 3. Add to `ProviderRegistry::create()`
//! 4. Add config fields in `config.rs`

mod types;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::config::Config;
use crate::error::Error;
use crate::message::{ChatChunk, ChatMessage};
use crate::tools::ToolDefinition;
use crate::Result;

pub use types::*;

pub mod gemini;

pub use gemini::GeminiBackend;

/// Streamed partial replies from a backend.
pub type ChunkStream = BoxStream<'static, Result<ChatChunk>>;

/// Everything a backend needs for one completion.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// System instruction, if any.
    pub system: Option<String>,

    /// Messages to answer, oldest first.
    pub messages: Vec<ChatMessage>,

    /// Functions the model may call.
    pub tools: Vec<ToolDefinition>,
}

/// LLM backend trait — the opaque capability behind a chat agent.
///
/// Implement this trait to add a new LLM provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Produce one complete reply.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatMessage>;

    /// Produce the reply as a stream, or `None` when the provider cannot stream.
    async fn complete_streaming(&self, _request: &ChatRequest) -> Result<Option<ChunkStream>> {
        Ok(None)
    }

    /// Model identifier used by this backend.
    fn model(&self) -> &str;
}

/// Provider registry — creates LLM backends dynamically.
///
/// # Example
///
/// ```ignore
/// let backend = ProviderRegistry::create(&config)?;
/// let reply = backend.complete(&request).await?;
/// ```
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Create a backend from configuration.
    ///
    /// Supported providers:
    /// - `"gemini"`: Gemini API with API key authentication
    pub fn create(config: &Config) -> Result<Arc<dyn LlmBackend>> {
        match config.provider.as_str() {
            "gemini" => {
                let api_key = config.api_key().ok_or_else(|| {
                    Error::Config(
                        "Gemini API key missing: set gemini_api_key or GEMINI_API_KEY".to_string(),
                    )
                })?;
                Ok(Arc::new(GeminiBackend::new(&api_key, &config.model)))
            }
            other => Err(Error::Config(format!("Unknown provider: {other}"))),
        }
    }

    /// List available provider names.
    pub fn available() -> &'static [&'static str] {
        &["gemini"]
    }
}

/// Fake backend for testing.
#[cfg(test)]
pub struct FakeBackend {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<ChatMessage>>>,
    requests: std::sync::Mutex<Vec<ChatRequest>>,
    calls: std::sync::atomic::AtomicUsize,
    chunked: bool,
}

#[cfg(test)]
impl FakeBackend {
    /// Create with predefined assistant text replies.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::with_messages(responses.into_iter().map(|r| ChatMessage::assistant(r)).collect())
    }

    /// Create with predefined structured replies.
    pub fn with_messages(responses: Vec<ChatMessage>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: std::sync::Mutex::new(Vec::new()),
            calls: std::sync::atomic::AtomicUsize::new(0),
            chunked: false,
        }
    }

    /// Create a backend whose first call fails.
    pub fn failing(message: &str) -> Self {
        let backend = Self::with_messages(vec![]);
        backend
            .responses
            .lock()
            .unwrap()
            .push_back(Err(Error::Llm(message.to_string())));
        backend
    }

    /// Stream each reply word by word.
    pub fn chunked(mut self) -> Self {
        self.chunked = true;
        self
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_response(&self, request: &ChatRequest) -> Result<ChatMessage> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Llm("No more fake responses".to_string())))
    }
}

#[cfg(test)]
#[async_trait]
impl LlmBackend for FakeBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatMessage> {
        self.next_response(request)
    }

    async fn complete_streaming(&self, request: &ChatRequest) -> Result<Option<ChunkStream>> {
        use futures_util::StreamExt;

        if !self.chunked {
            return Ok(None);
        }
        let reply = self.next_response(request)?;
        let mut chunks: Vec<ChatChunk> = reply.text().split_inclusive(' ').map(ChatChunk::text).collect();
        let others: Vec<_> = reply.items.iter().filter(|i| i.as_text().is_none()).cloned().collect();
        if !others.is_empty() {
            chunks.push(ChatChunk { role: None, items: others });
        }
        if let Some(first) = chunks.first_mut() {
            first.role = Some(reply.role);
        }
        Ok(Some(futures_util::stream::iter(chunks.into_iter().map(Ok)).boxed()))
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}
