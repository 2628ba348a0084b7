//! Chat module — drives a conversation between two agents.
//!
//! The orchestrator owns the transcript. Starting from an opening envelope
//! delivered to the responder, each turn sends the latest envelope to the
//! agent whose turn it is, appends the reply, and checks the termination
//! predicate. Turns alternate until a stop signal, the turn limit, a failed
//! `send`, or cancellation.

mod termination;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::Agent;
use crate::error::Error;
use crate::message::{
    ChatMessage, Content, Envelope, MultiModalMessage, Part, Role, TextMessage, VariantTag,
};
use crate::Result;

pub use termination::{Termination, DEFAULT_TERMINATION_KEYWORD};

/// Turn limit used when none is configured.
pub const DEFAULT_MAX_TURNS: usize = 10;

/// Why a chat ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// A reply satisfied the termination predicate.
    StopSignal,
    /// The configured number of turns was used up.
    TurnLimit,
}

/// Orchestrator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    /// Waiting for the named agent to reply.
    AwaitingTurn(String),
    Terminated(TerminationReason),
}

/// Result of a finished chat.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub reason: TerminationReason,
    /// Replies produced (the opening is not a turn).
    pub turns: usize,
    pub transcript: Vec<Envelope>,
}

/// Drives a two-party conversation.
///
/// Both parties may be the same agent; every `send` is treated alike.
pub struct ChatOrchestrator {
    initiator: Arc<dyn Agent>,
    responder: Arc<dyn Agent>,
    termination: Termination,
    max_turns: usize,
    require_completion: bool,
    transcript: Vec<Envelope>,
    turns: usize,
    responder_next: bool,
    state: ChatState,
}

impl ChatOrchestrator {
    pub fn new(initiator: Arc<dyn Agent>, responder: Arc<dyn Agent>) -> Self {
        let state = ChatState::AwaitingTurn(responder.name().to_string());
        Self {
            initiator,
            responder,
            termination: Termination::default(),
            max_turns: DEFAULT_MAX_TURNS,
            require_completion: false,
            transcript: Vec::new(),
            turns: 0,
            responder_next: true,
            state,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    /// Treat reaching the turn limit as [`Error::TurnLimitExceeded`]
    /// instead of an ordinary stop.
    pub fn require_completion(mut self, required: bool) -> Self {
        self.require_completion = required;
        self
    }

    /// Wrap `text` in a variant `receiver` accepts, authored by `sender`.
    pub fn opening_for(receiver: &dyn Agent, text: &str, sender: &str) -> Envelope {
        let accepts = receiver.accepts();
        let content: Content = if accepts.contains(VariantTag::Text) {
            TextMessage::assistant(text).into()
        } else if accepts.contains(VariantTag::Chat) {
            ChatMessage::assistant(text).into()
        } else if accepts.contains(VariantTag::MultiModal) {
            MultiModalMessage::new(Role::Assistant, vec![Part::Text { text: text.to_string() }]).into()
        } else {
            // Rejected by the receiver on the first turn.
            TextMessage::assistant(text).into()
        };
        Envelope::wrap(content, sender)
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn transcript(&self) -> &[Envelope] {
        &self.transcript
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Reset the conversation with `opening` as its first envelope.
    pub fn start(&mut self, opening: Envelope) {
        info!(
            initiator = self.initiator.name(),
            responder = self.responder.name(),
            max_turns = self.max_turns,
            "starting chat"
        );
        self.transcript = vec![opening];
        self.turns = 0;
        self.responder_next = true;
        self.state = ChatState::AwaitingTurn(self.responder.name().to_string());
    }

    /// Run exactly one turn.
    ///
    /// On a failed `send` the error is returned and nothing is appended.
    pub async fn step(&mut self) -> Result<&ChatState> {
        if matches!(self.state, ChatState::Terminated(_)) {
            return Ok(&self.state);
        }
        if self.turns >= self.max_turns {
            return self.hit_turn_limit();
        }

        let inbound = self
            .transcript
            .last()
            .cloned()
            .ok_or_else(|| Error::Other("chat has not been started".to_string()))?;
        let speaker = if self.responder_next {
            Arc::clone(&self.responder)
        } else {
            Arc::clone(&self.initiator)
        };

        debug!(turn = self.turns + 1, speaker = speaker.name(), "turn");
        let reply = speaker.send(inbound).await?;
        self.transcript.push(reply);
        self.turns += 1;

        let last = &self.transcript[self.transcript.len() - 1];
        if self.termination.is_met(last) {
            info!(turns = self.turns, sender = last.sender(), "chat terminated by stop signal");
            self.state = ChatState::Terminated(TerminationReason::StopSignal);
            return Ok(&self.state);
        }
        if self.turns >= self.max_turns {
            return self.hit_turn_limit();
        }

        self.responder_next = !self.responder_next;
        let next = if self.responder_next { &self.responder } else { &self.initiator };
        self.state = ChatState::AwaitingTurn(next.name().to_string());
        Ok(&self.state)
    }

    /// Start from `opening` and run turns until the chat terminates.
    pub async fn run(&mut self, opening: Envelope) -> Result<ChatOutcome> {
        self.start(opening);
        loop {
            let state = self.step().await?.clone();
            if let ChatState::Terminated(reason) = state {
                return Ok(ChatOutcome {
                    reason,
                    turns: self.turns,
                    transcript: self.transcript.clone(),
                });
            }
        }
    }

    /// Like [`ChatOrchestrator::run`], but stop with [`Error::Cancelled`]
    /// as soon as `cancel` resolves. The in-flight `send` is dropped and its
    /// reply never reaches the transcript.
    pub async fn run_until<F>(&mut self, opening: Envelope, cancel: F) -> Result<ChatOutcome>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            outcome = self.run(opening) => outcome,
            _ = cancel => {
                info!("chat cancelled");
                Err(Error::Cancelled)
            }
        }
    }

    fn hit_turn_limit(&mut self) -> Result<&ChatState> {
        info!(turns = self.turns, "chat reached its turn limit");
        self.state = ChatState::Terminated(TerminationReason::TurnLimit);
        if self.require_completion {
            return Err(Error::TurnLimitExceeded {
                max_turns: self.max_turns,
            });
        }
        Ok(&self.state)
    }
}
