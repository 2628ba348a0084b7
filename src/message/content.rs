//! Content payloads carried by an [`Envelope`](super::Envelope).

use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use super::variant::VariantTag;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Where an image's bytes live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    Url { url: Url },
    Data { mime_type: String, data: String },
}

impl ImageSource {
    /// Inline image from raw bytes, stored base64-encoded.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        ImageSource::Data {
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn url(url: Url) -> Self {
        ImageSource::Url { url }
    }

    /// Short human-readable description, e.g. for console rendering.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Url { url } => url.to_string(),
            ImageSource::Data { mime_type, data } => {
                format!("<{} image, {} base64 chars>", mime_type, data.len())
            }
        }
    }
}

/// A function the model asked to invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The outcome of a [`FunctionCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub call_id: String,
    pub name: String,
    pub result: String,
}

/// A single item of structured chat content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatItem {
    Text { text: String },
    Image { source: ImageSource },
    FunctionCall(FunctionCall),
    FunctionResult(FunctionResult),
}

impl ChatItem {
    pub fn text(text: impl Into<String>) -> Self {
        ChatItem::Text { text: text.into() }
    }

    pub fn image(source: ImageSource) -> Self {
        ChatItem::Image { source }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChatItem::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Plain text with a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
    pub role: Role,
    pub text: String,
}

impl TextMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self { role, text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Role plus rich content items; the native shape of chat-completion backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub items: Vec<ChatItem>,
}

impl ChatMessage {
    pub fn new(role: Role, items: Vec<ChatItem>) -> Self {
        Self { role, items }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ChatItem::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ChatItem::text(text)])
    }

    /// Add an item to the message
    pub fn with_item(mut self, item: ChatItem) -> Self {
        self.items.push(item);
        self
    }

    /// All text items joined with newlines.
    pub fn text(&self) -> String {
        join_text(self.items.iter().filter_map(ChatItem::as_text))
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.items.iter().filter_map(|item| match item {
            ChatItem::FunctionCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn function_results(&self) -> impl Iterator<Item = &FunctionResult> {
        self.items.iter().filter_map(|item| match item {
            ChatItem::FunctionResult(result) => Some(result),
            _ => None,
        })
    }

    pub fn has_images(&self) -> bool {
        self.items.iter().any(|i| matches!(i, ChatItem::Image { .. }))
    }
}

/// A partial [`ChatMessage`] produced while streaming.
///
/// Text items of consecutive chunks concatenate; the role, when present,
/// applies to the whole reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub items: Vec<ChatItem>,
}

impl ChatChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            role: None,
            items: vec![ChatItem::text(text)],
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }
}

/// One part of a [`MultiModalMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    Image { source: ImageSource },
}

/// Ordered list of heterogeneous parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiModalMessage {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl MultiModalMessage {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    pub fn text(&self) -> String {
        join_text(self.parts.iter().filter_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            Part::Image { .. } => None,
        }))
    }
}

/// The closed set of payloads an envelope can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", content = "payload", rename_all = "snake_case")]
pub enum Content {
    Text(TextMessage),
    Chat(ChatMessage),
    Chunk(ChatChunk),
    MultiModal(MultiModalMessage),
}

impl Content {
    pub fn variant(&self) -> VariantTag {
        match self {
            Content::Text(_) => VariantTag::Text,
            Content::Chat(_) => VariantTag::Chat,
            Content::Chunk(_) => VariantTag::Chunk,
            Content::MultiModal(_) => VariantTag::MultiModal,
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Content::Text(m) => Some(m.role),
            Content::Chat(m) => Some(m.role),
            Content::Chunk(c) => c.role,
            Content::MultiModal(m) => Some(m.role),
        }
    }

    /// Primary text of the payload, used for rendering and termination checks.
    pub fn text(&self) -> String {
        match self {
            Content::Text(m) => m.text.clone(),
            Content::Chat(m) => m.text(),
            Content::Chunk(c) => c.items.iter().filter_map(ChatItem::as_text).collect(),
            Content::MultiModal(m) => m.text(),
        }
    }
}

impl From<TextMessage> for Content {
    fn from(m: TextMessage) -> Self {
        Content::Text(m)
    }
}

impl From<ChatMessage> for Content {
    fn from(m: ChatMessage) -> Self {
        Content::Chat(m)
    }
}

impl From<ChatChunk> for Content {
    fn from(c: ChatChunk) -> Self {
        Content::Chunk(c)
    }
}

impl From<MultiModalMessage> for Content {
    fn from(m: MultiModalMessage) -> Self {
        Content::MultiModal(m)
    }
}

fn join_text<'a>(texts: impl Iterator<Item = &'a str>) -> String {
    texts.collect::<Vec<_>>().join("\n")
}
