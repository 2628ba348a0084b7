//! Message module — the typed envelope agents exchange.
//!
//! This module contains:
//! - Content variants (plain text, structured chat, streaming chunk, multi-modal)
//! - The [`Envelope`] wrapping one payload with its sender
//! - [`VariantTag`] / [`VariantSet`] used to negotiate what an agent accepts
//! - Conversions between the generic variants and structured chat

pub mod convert;
mod content;
mod envelope;
mod variant;

pub use content::{
    ChatChunk, ChatItem, ChatMessage, Content, FunctionCall, FunctionResult, ImageSource,
    MultiModalMessage, Part, Role, TextMessage,
};
pub use envelope::{variant_of, wrap, Envelope};
pub use variant::{VariantSet, VariantTag};
