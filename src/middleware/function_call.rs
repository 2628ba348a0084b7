//! Function-call middleware — runs the tools a reply asks for.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{future, stream, StreamExt};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::EnvelopeStream;
use crate::message::convert;
use crate::message::{ChatChunk, ChatItem, ChatMessage, Content, Envelope, FunctionCall, FunctionResult};
use crate::tools::ToolRunner;
use crate::Result;

use super::{Middleware, Next};

/// Metadata key under which tool definitions are advertised to the agent.
pub const TOOLS_KEY: &str = "tools";

/// Advertises the runner's tools on the way in and, on the way out, executes
/// every function call in a structured chat reply, appending one result
/// item per call.
///
/// Calls `next` exactly once; results are not fed back to the backend. When
/// streaming, the results follow the reply as one trailing chunk.
pub struct FunctionCallMiddleware {
    runner: Arc<ToolRunner>,
}

impl FunctionCallMiddleware {
    pub fn new(runner: Arc<ToolRunner>) -> Self {
        Self { runner }
    }

    fn advertise(&self, envelope: Envelope) -> Envelope {
        envelope.with_metadata(TOOLS_KEY, json!(self.runner.definitions()))
    }
}

/// Calls in `message` that have no result yet.
fn pending_calls(message: &ChatMessage) -> Vec<FunctionCall> {
    let answered: Vec<&str> = message.function_results().map(|r| r.call_id.as_str()).collect();
    message
        .function_calls()
        .filter(|call| !answered.contains(&call.id.as_str()))
        .cloned()
        .collect()
}

async fn execute(runner: &ToolRunner, call: &FunctionCall) -> FunctionResult {
    debug!("Executing tool: {} with args: {}", call.name, call.arguments);

    let result = match runner.execute(&call.name, call.arguments.clone()).await {
        Ok(result) => {
            debug!("Tool {} succeeded: {} chars", call.name, result.len());
            result
        }
        Err(e) => {
            warn!("Tool {} failed: {}", call.name, e);
            format!("Error: {}", e)
        }
    };

    FunctionResult {
        call_id: call.id.clone(),
        name: call.name.clone(),
        result,
    }
}

/// What a streamed reply contained so far.
#[derive(Default)]
struct Seen {
    parent: Option<Uuid>,
    chunks: Vec<ChatChunk>,
    failed: bool,
}

impl Seen {
    fn record(&mut self, item: &Result<Envelope>) {
        let Ok(reply) = item else {
            self.failed = true;
            return;
        };
        if self.parent.is_none() {
            self.parent = reply.parent();
        }
        match reply.content() {
            Content::Chunk(chunk) => self.chunks.push(chunk.clone()),
            Content::Chat(message) => self.chunks.push(ChatChunk {
                role: Some(message.role),
                items: message.items.clone(),
            }),
            Content::Text(_) | Content::MultiModal(_) => {}
        }
    }
}

#[async_trait]
impl Middleware for FunctionCallMiddleware {
    fn name(&self) -> &str {
        "function-call"
    }

    async fn invoke(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope> {
        let reply = next.run(self.advertise(envelope)).await?;

        let Content::Chat(message) = reply.content() else {
            return Ok(reply);
        };
        let pending = pending_calls(message);
        if pending.is_empty() {
            return Ok(reply);
        }

        let mut message = message.clone();
        for call in &pending {
            let result = execute(&self.runner, call).await;
            message.items.push(ChatItem::FunctionResult(result));
        }
        Ok(reply.with_content(message))
    }

    async fn invoke_streaming(&self, envelope: Envelope, next: Next<'_>) -> Result<EnvelopeStream> {
        let sender = next.agent_name().to_string();
        let replies = next.run_streaming(self.advertise(envelope)).await?;

        let seen = Arc::new(Mutex::new(Seen::default()));
        let recorder = Arc::clone(&seen);
        let recorded = replies.inspect(move |item| {
            if let Ok(mut seen) = recorder.lock() {
                seen.record(item);
            }
        });

        let runner = Arc::clone(&self.runner);
        let trailer = stream::once(async move {
            let seen = match seen.lock() {
                Ok(mut seen) => std::mem::take(&mut *seen),
                Err(_) => return None,
            };
            if seen.failed {
                return None;
            }
            let pending = pending_calls(&convert::merge_chunks(&seen.chunks));
            if pending.is_empty() {
                return None;
            }

            let mut items = Vec::with_capacity(pending.len());
            for call in &pending {
                items.push(ChatItem::FunctionResult(execute(&runner, call).await));
            }
            let mut results = Envelope::wrap(ChatChunk { role: None, items }, sender);
            if let Some(parent) = seen.parent {
                results = results.with_parent(parent);
            }
            Some(Ok(results))
        })
        .filter_map(future::ready);

        Ok(recorded.chain(trailer).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeBackend;
    use crate::agent::{collect_stream, Agent, AgentExt, ChatAgent};
    use crate::message::{Role, TextMessage};
    use crate::middleware::ChatConnector;
    use crate::tools::LightPlugin;

    fn light_runner() -> (LightPlugin, Arc<ToolRunner>) {
        let light = LightPlugin::new();
        let mut runner = ToolRunner::new();
        light.register(&mut runner);
        (light, Arc::new(runner))
    }

    fn call(name: &str, arguments: serde_json::Value) -> ChatItem {
        ChatItem::FunctionCall(FunctionCall {
            id: "tc_0".to_string(),
            name: name.to_string(),
            arguments,
        })
    }

    #[tokio::test]
    async fn test_executes_calls_and_appends_results() {
        let (light, runner) = light_runner();
        let backend = Arc::new(FakeBackend::with_messages(vec![ChatMessage::new(
            Role::Assistant,
            vec![call("change_state", json!({"new_state": true}))],
        )]));
        let agent = ChatAgent::new("assistant", backend.clone())
            .register_middleware(FunctionCallMiddleware::new(runner));

        let reply = agent.send(Envelope::wrap(ChatMessage::user("Toggle the light"), "user")).await.unwrap();

        let message = reply.as_chat().unwrap();
        let result = message.function_results().next().unwrap();
        assert_eq!(result.result, "on");
        assert_eq!(result.call_id, "tc_0");
        assert!(light.is_on());
        assert_eq!(backend.calls(), 1);
        assert_eq!(backend.requests()[0].tools.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error_text() {
        let (_light, runner) = light_runner();
        let backend = Arc::new(FakeBackend::with_messages(vec![ChatMessage::new(
            Role::Assistant,
            vec![call("dim", json!({}))],
        )]));
        let agent = ChatAgent::new("assistant", backend)
            .register_middleware(FunctionCallMiddleware::new(runner));

        let reply = agent.send(Envelope::wrap(ChatMessage::user("dim it"), "user")).await.unwrap();

        let result = reply.as_chat().unwrap().function_results().next().unwrap().clone();
        assert!(result.result.starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_results_reach_text_callers_through_connector() {
        let (_light, runner) = light_runner();
        let backend = Arc::new(FakeBackend::with_messages(vec![ChatMessage::new(
            Role::Assistant,
            vec![call("get_state", json!({}))],
        )]));
        let agent = ChatAgent::new("assistant", backend)
            .register_middleware(FunctionCallMiddleware::new(runner))
            .register_middleware(ChatConnector::new());

        let reply = agent.send(Envelope::text("Is the light on?", "user")).await.unwrap();

        assert_eq!(reply.as_text(), Some(&TextMessage::assistant("off")));
        assert!(reply.metadata().contains_key(crate::message::convert::TOOL_CALLS_KEY));
    }

    #[tokio::test]
    async fn test_streaming_runs_calls_after_the_reply() {
        let (light, runner) = light_runner();
        let backend = Arc::new(
            FakeBackend::with_messages(vec![ChatMessage::new(
                Role::Assistant,
                vec![call("change_state", json!({"new_state": true}))],
            )])
            .chunked(),
        );
        let agent = ChatAgent::new("assistant", backend.clone())
            .register_middleware(FunctionCallMiddleware::new(runner));

        let stream = agent
            .send_streaming(Envelope::wrap(ChatMessage::user("Toggle the light"), "user"))
            .await
            .unwrap();
        let reply = collect_stream(stream).await.unwrap();

        assert_eq!(backend.requests()[0].tools.len(), 2);
        assert!(light.is_on());
        let message = reply.as_chat().unwrap();
        assert_eq!(message.function_calls().count(), 1);
        let results: Vec<_> = message.function_results().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].call_id, "tc_0");
        assert_eq!(results[0].result, "on");
    }

    #[tokio::test]
    async fn test_streaming_without_calls_adds_nothing() {
        let (_light, runner) = light_runner();
        let backend = Arc::new(FakeBackend::new(vec!["nothing to do"]).chunked());
        let agent = ChatAgent::new("assistant", backend)
            .register_middleware(FunctionCallMiddleware::new(runner));

        let stream = agent
            .send_streaming(Envelope::wrap(ChatMessage::user("hi"), "user"))
            .await
            .unwrap();
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|item| item.is_ok()));
    }

    #[tokio::test]
    async fn test_streamed_and_sent_replies_agree_for_text_callers() {
        let (_light, runner) = light_runner();
        let get_state = || ChatMessage::new(Role::Assistant, vec![call("get_state", json!({}))]);
        let backend = Arc::new(FakeBackend::with_messages(vec![get_state(), get_state()]).chunked());
        let agent = ChatAgent::new("assistant", backend)
            .register_middleware(FunctionCallMiddleware::new(runner))
            .register_middleware(ChatConnector::new());

        let sent = agent.send(Envelope::text("Is the light on?", "user")).await.unwrap();
        let stream = agent.send_streaming(Envelope::text("Is the light on?", "user")).await.unwrap();
        let streamed = collect_stream(stream).await.unwrap();

        assert_eq!(streamed.content(), sent.content());
        assert_eq!(streamed.as_text(), Some(&TextMessage::assistant("off")));
        assert_eq!(
            streamed.metadata().get(convert::TOOL_CALLS_KEY),
            sent.metadata().get(convert::TOOL_CALLS_KEY)
        );
        assert_eq!(
            streamed.metadata().get(convert::TOOL_RESULTS_KEY),
            sent.metadata().get(convert::TOOL_RESULTS_KEY)
        );
    }
}
