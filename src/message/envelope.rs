//! The message envelope exchanged between agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::content::{ChatMessage, Content, TextMessage};
use super::variant::VariantTag;

/// Immutable container of one content payload plus its sender.
///
/// Transformations consume the envelope and return a new one; the id, sender
/// and parent carry over unless [`Envelope::reattribute`] is called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    id: Uuid,
    sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<Uuid>,
    created: DateTime<Utc>,
    content: Content,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
}

impl Envelope {
    /// Wrap a payload sent by `sender`.
    pub fn wrap(content: impl Into<Content>, sender: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            parent: None,
            created: Utc::now(),
            content: content.into(),
            metadata: Map::new(),
        }
    }

    /// Plain text from a user.
    pub fn text(text: impl Into<String>, sender: impl Into<String>) -> Self {
        Self::wrap(TextMessage::user(text), sender)
    }

    /// Wrap `content` as a reply to `parent`.
    pub fn reply_to(parent: &Envelope, content: impl Into<Content>, sender: impl Into<String>) -> Self {
        Self::wrap(content, sender).with_parent(parent.id)
    }

    pub fn with_parent(mut self, parent: Uuid) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Replace the payload, keeping id, sender, parent and metadata.
    pub fn with_content(mut self, content: impl Into<Content>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn without_metadata(mut self, key: &str) -> Self {
        self.metadata.remove(key);
        self
    }

    /// Explicitly change the author of this envelope.
    pub fn reattribute(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn parent(&self) -> Option<Uuid> {
        self.parent
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn into_content(self) -> Content {
        self.content
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Which content variant this envelope carries.
    #[inline]
    pub fn variant(&self) -> VariantTag {
        self.content.variant()
    }

    /// Primary text of the payload.
    pub fn text_content(&self) -> String {
        self.content.text()
    }

    pub fn as_chat(&self) -> Option<&ChatMessage> {
        match &self.content {
            Content::Chat(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextMessage> {
        match &self.content {
            Content::Text(m) => Some(m),
            _ => None,
        }
    }
}

/// Free-function form of [`Envelope::wrap`].
pub fn wrap(content: impl Into<Content>, sender: impl Into<String>) -> Envelope {
    Envelope::wrap(content, sender)
}

/// Free-function form of [`Envelope::variant`].
pub fn variant_of(envelope: &Envelope) -> VariantTag {
    envelope.variant()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChatItem;

    #[test]
    fn test_wrap_and_variant() {
        let env = wrap(TextMessage::user("Toggle the light"), "user");
        assert_eq!(variant_of(&env), VariantTag::Text);
        assert_eq!(env.sender(), "user");
        assert_eq!(env.text_content(), "Toggle the light");
        assert!(env.parent().is_none());
    }

    #[test]
    fn test_with_content_preserves_identity() {
        let env = Envelope::text("hi", "user");
        let id = env.id();
        let converted = env.with_content(ChatMessage::new(
            crate::message::Role::User,
            vec![ChatItem::text("hi")],
        ));
        assert_eq!(converted.id(), id);
        assert_eq!(converted.sender(), "user");
        assert_eq!(converted.variant(), VariantTag::Chat);
    }

    #[test]
    fn test_reply_links_parent() {
        let inbound = Envelope::text("ping", "user");
        let reply = Envelope::reply_to(&inbound, TextMessage::assistant("pong"), "bot");
        assert_eq!(reply.parent(), Some(inbound.id()));
        assert_ne!(reply.id(), inbound.id());
    }
}
