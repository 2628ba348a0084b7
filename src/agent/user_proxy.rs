//! User proxy agent — puts a human in the conversation.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::message::{Envelope, TextMessage, VariantSet, VariantTag};
use crate::Result;

use super::Agent;

/// Input that ends the conversation when typed by the human.
const EXIT_COMMAND: &str = "exit";

/// When the proxy asks its human for a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumanInputMode {
    /// Ask for every reply.
    #[default]
    Always,
    /// Never ask; answer with the default reply.
    Never,
}

/// Source of human replies.
#[async_trait]
pub trait HumanInput: Send + Sync {
    async fn read_line(&self, prompt: &str) -> Result<String>;
}

/// Reads replies from the terminal.
pub struct ConsoleInput;

#[async_trait]
impl HumanInput for ConsoleInput {
    async fn read_line(&self, prompt: &str) -> Result<String> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || inquire::Text::new(&prompt).prompt())
            .await
            .map_err(|e| Error::Input(e.to_string()))?
            .map_err(|e| Error::Input(e.to_string()))
    }
}

/// Replays a fixed list of replies.
#[derive(Default)]
pub struct ScriptedInput {
    lines: Mutex<VecDeque<String>>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Mutex::new(lines.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl HumanInput for ScriptedInput {
    async fn read_line(&self, _prompt: &str) -> Result<String> {
        self.lines
            .lock()
            .map_err(|_| Error::Input("scripted input poisoned".to_string()))?
            .pop_front()
            .ok_or_else(|| Error::Input("no more scripted input".to_string()))
    }
}

/// Agent that relays each inbound message to a human and returns their answer.
pub struct UserProxyAgent {
    name: String,
    mode: HumanInputMode,
    default_reply: String,
    termination_keyword: String,
    input: Arc<dyn HumanInput>,
}

impl UserProxyAgent {
    /// A proxy reading from the console.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: HumanInputMode::Always,
            default_reply: String::new(),
            termination_keyword: crate::chat::DEFAULT_TERMINATION_KEYWORD.to_string(),
            input: Arc::new(ConsoleInput),
        }
    }

    pub fn with_mode(mut self, mode: HumanInputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Text sent when the human types `exit`.
    pub fn with_termination_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.termination_keyword = keyword.into();
        self
    }

    pub fn with_input(mut self, input: Arc<dyn HumanInput>) -> Self {
        self.input = input;
        self
    }

    async fn human_reply(&self, envelope: &Envelope) -> Result<String> {
        if self.mode == HumanInputMode::Never {
            return Ok(self.default_reply.clone());
        }

        let prompt = format!(
            "Reply to {} (type '{}' to end the chat):",
            envelope.sender(),
            EXIT_COMMAND
        );
        let line = self.input.read_line(&prompt).await?;
        let line = line.trim();

        Ok(if line.eq_ignore_ascii_case(EXIT_COMMAND) {
            self.termination_keyword.clone()
        } else if line.is_empty() {
            self.default_reply.clone()
        } else {
            line.to_string()
        })
    }
}

#[async_trait]
impl Agent for UserProxyAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self) -> VariantSet {
        VariantSet::of(&[VariantTag::Text, VariantTag::Chat, VariantTag::MultiModal])
    }

    async fn generate_reply(&self, envelope: Envelope) -> Result<Envelope> {
        let text = self.human_reply(&envelope).await?;
        debug!(agent = %self.name, "human replied with {} chars", text.len());
        Ok(Envelope::reply_to(&envelope, TextMessage::user(text), &self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(lines: &[&str]) -> UserProxyAgent {
        UserProxyAgent::new("user")
            .with_default_reply("continue")
            .with_input(Arc::new(ScriptedInput::new(lines.iter().copied())))
    }

    #[tokio::test]
    async fn test_always_mode_reads_input() {
        let agent = proxy(&["turn it off"]);
        let reply = agent.send(Envelope::text("how can I help you today", "assistant")).await.unwrap();

        assert_eq!(reply.as_text(), Some(&TextMessage::user("turn it off")));
        assert_eq!(reply.sender(), "user");
    }

    #[tokio::test]
    async fn test_exit_maps_to_termination_keyword() {
        let agent = proxy(&["  EXIT "]);
        let reply = agent.send(Envelope::text("anything else?", "assistant")).await.unwrap();
        assert_eq!(reply.text_content(), "TERMINATE");
    }

    #[tokio::test]
    async fn test_empty_input_uses_default_reply() {
        let agent = proxy(&[""]);
        let reply = agent.send(Envelope::text("?", "assistant")).await.unwrap();
        assert_eq!(reply.text_content(), "continue");
    }

    #[tokio::test]
    async fn test_never_mode_skips_input() {
        let agent = proxy(&[]).with_mode(HumanInputMode::Never);
        let reply = agent.send(Envelope::text("?", "assistant")).await.unwrap();
        assert_eq!(reply.text_content(), "continue");
    }

    #[tokio::test]
    async fn test_exhausted_input_fails() {
        let agent = proxy(&[]);
        let err = agent.send(Envelope::text("?", "assistant")).await.unwrap_err();
        assert_eq!(err.failed_stage(), Some("user"));
    }
}
