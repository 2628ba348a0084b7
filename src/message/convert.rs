//! Two-way mapping between the generic variants and structured chat.
//!
//! Text and multi-modal content round-trip through [`ChatMessage`] without
//! loss. Going the other way, items the target variant has no slot for
//! (function calls and results) are returned as auxiliary metadata.

use serde_json::{json, Map, Value};

use crate::error::Error;
use crate::Result;

use super::content::{ChatChunk, ChatItem, ChatMessage, Content, MultiModalMessage, Part, Role, TextMessage};
use super::variant::VariantTag;

/// Metadata key holding function calls dropped from a reply's payload.
pub const TOOL_CALLS_KEY: &str = "tool_calls";
/// Metadata key holding function results dropped from a reply's payload.
pub const TOOL_RESULTS_KEY: &str = "tool_results";
/// Metadata key on streamed chunks naming the variant the full reply takes.
pub const REPLY_VARIANT_KEY: &str = "reply_variant";

/// Role given to chunks that do not carry one.
const DEFAULT_CHUNK_ROLE: Role = Role::Assistant;

/// Content converted out of a [`ChatMessage`], plus anything set aside.
#[derive(Debug, Clone, PartialEq)]
pub struct Adapted {
    pub content: Content,
    pub auxiliary: Map<String, Value>,
}

/// Convert any content variant into a [`ChatMessage`].
///
/// Fails with [`Error::UnrepresentableContent`] when the content holds an
/// image and `allow_images` is false.
pub fn to_chat(content: &Content, allow_images: bool) -> Result<ChatMessage> {
    let message = match content {
        Content::Text(m) => ChatMessage::new(m.role, vec![ChatItem::text(m.text.clone())]),
        Content::Chat(m) => m.clone(),
        Content::Chunk(c) => merge_chunks(std::iter::once(c)),
        Content::MultiModal(m) => ChatMessage::new(
            m.role,
            m.parts
                .iter()
                .map(|p| match p {
                    Part::Text { text } => ChatItem::text(text.clone()),
                    Part::Image { source } => ChatItem::image(source.clone()),
                })
                .collect(),
        ),
    };

    if !allow_images && message.has_images() {
        return Err(Error::UnrepresentableContent(format!(
            "{} content carries an image but the backend only accepts text",
            content.variant()
        )));
    }
    Ok(message)
}

/// Convert a [`ChatMessage`] toward `target`.
///
/// Text targets fall back to multi-modal when the message holds images,
/// since a plain string cannot carry them.
pub fn from_chat(message: ChatMessage, target: VariantTag) -> Adapted {
    match target {
        VariantTag::Chat => Adapted {
            content: Content::Chat(message),
            auxiliary: Map::new(),
        },
        VariantTag::Chunk => Adapted {
            content: Content::Chunk(ChatChunk {
                role: Some(message.role),
                items: message.items,
            }),
            auxiliary: Map::new(),
        },
        VariantTag::Text if !message.has_images() => {
            let auxiliary = tool_metadata(&message);
            let text = primary_text(&message);
            Adapted {
                content: Content::Text(TextMessage::new(message.role, text)),
                auxiliary,
            }
        }
        VariantTag::Text | VariantTag::MultiModal => {
            let auxiliary = tool_metadata(&message);
            let has_text = message.items.iter().any(|i| matches!(i, ChatItem::Text { .. }));
            let mut parts: Vec<Part> = message
                .items
                .iter()
                .filter_map(|item| match item {
                    ChatItem::Text { text } => Some(Part::Text { text: text.clone() }),
                    ChatItem::Image { source } => Some(Part::Image { source: source.clone() }),
                    ChatItem::FunctionCall(_) | ChatItem::FunctionResult(_) => None,
                })
                .collect();
            if !has_text {
                let text = primary_text(&message);
                if !text.is_empty() {
                    parts.insert(0, Part::Text { text });
                }
            }
            Adapted {
                content: Content::MultiModal(MultiModalMessage::new(message.role, parts)),
                auxiliary,
            }
        }
    }
}

/// Fold streamed chunks into one message, concatenating adjacent text.
pub fn merge_chunks<'a>(chunks: impl IntoIterator<Item = &'a ChatChunk>) -> ChatMessage {
    let mut role = None;
    let mut items: Vec<ChatItem> = Vec::new();

    for chunk in chunks {
        if role.is_none() {
            role = chunk.role;
        }
        for item in &chunk.items {
            match (items.last_mut(), item) {
                (Some(ChatItem::Text { text: acc }), ChatItem::Text { text }) => acc.push_str(text),
                _ => items.push(item.clone()),
            }
        }
    }

    ChatMessage::new(role.unwrap_or(DEFAULT_CHUNK_ROLE), items)
}

/// Text of the message, or the function results when it has no text.
fn primary_text(message: &ChatMessage) -> String {
    let text = message.text();
    if !text.is_empty() {
        return text;
    }
    message
        .function_results()
        .map(|r| r.result.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn tool_metadata(message: &ChatMessage) -> Map<String, Value> {
    let mut aux = Map::new();
    let calls: Vec<_> = message.function_calls().collect();
    if !calls.is_empty() {
        aux.insert(TOOL_CALLS_KEY.to_string(), json!(calls));
    }
    let results: Vec<_> = message.function_results().collect();
    if !results.is_empty() {
        aux.insert(TOOL_RESULTS_KEY.to_string(), json!(results));
    }
    aux
}
