//! Console sink — prints every reply in a human-readable format.

use async_trait::async_trait;
use futures_util::{future, stream, StreamExt};

use crate::agent::EnvelopeStream;
use crate::message::{Content, Envelope};
use crate::ui;
use crate::Result;

use super::{Middleware, Next};

/// Prints replies as they leave the chain. Never alters them.
#[derive(Debug, Clone, Default)]
pub struct PrintMessageMiddleware {
    spinner: bool,
}

impl PrintMessageMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a spinner while the rest of the chain runs.
    pub fn with_spinner(mut self, spinner: bool) -> Self {
        self.spinner = spinner;
        self
    }
}

#[async_trait]
impl Middleware for PrintMessageMiddleware {
    fn name(&self) -> &str {
        "print-message"
    }

    async fn invoke(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope> {
        let spinner = self
            .spinner
            .then(|| ui::spinner(&format!("{} is thinking", next.agent_name())));

        let result = next.run(envelope).await;
        if let Some(bar) = spinner {
            bar.finish_and_clear();
        }

        let reply = result?;
        ui::print_envelope(&reply);
        Ok(reply)
    }

    async fn invoke_streaming(&self, envelope: Envelope, next: Next<'_>) -> Result<EnvelopeStream> {
        let replies = next.run_streaming(envelope).await?;

        let mut started = false;
        let printed = replies.inspect(move |item| {
            let Ok(reply) = item else { return };
            match reply.content() {
                Content::Chunk(_) => {
                    if !started {
                        ui::print_stream_header(reply.sender());
                        started = true;
                    }
                    ui::print_delta(&reply.text_content());
                }
                _ => ui::print_envelope(reply),
            }
        });
        let newline = stream::once(async { println!() })
            .filter_map(|_| future::ready(None::<Result<Envelope>>));

        Ok(printed.chain(newline).boxed())
    }
}
