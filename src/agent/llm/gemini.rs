//! Gemini backend implementation (API key authentication).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Error;
use crate::message::{ChatItem, ChatMessage, FunctionCall, ImageSource, Role};
use crate::tools::ToolDefinition;
use crate::Result;

use super::{ChatRequest, GeminiResponse, LlmBackend};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini API backend using API key authentication.
#[derive(Clone)]
pub struct GeminiBackend {
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiBackend {
    /// Create a new Gemini backend with API key.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: Client::new(),
        }
    }

    fn build_url(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_URL, self.model, self.api_key
        )
    }

    fn build_request(&self, request: &ChatRequest) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    Role::Tool => "function",
                    Role::User | Role::System => "user",
                };
                json!({
                    "role": role,
                    "parts": m.items.iter().map(convert_item).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": 0.7,
                "maxOutputTokens": 8192
            }
        });

        if let Some(system) = system_instruction(request) {
            body["systemInstruction"] = json!({
                "parts": [{"text": system}]
            });
        }

        if let Some(tools) = convert_tools(&request.tools) {
            body["tools"] = tools;
        }

        body
    }

    fn parse_response(&self, response: &GeminiResponse) -> Result<ChatMessage> {
        let candidate = response
            .candidates
            .first()
            .ok_or_else(|| Error::Llm("No candidates in response".to_string()))?;

        let mut items = Vec::new();
        let mut calls = 0;

        for part in &candidate.content.parts {
            if let Some(ref text) = part.text {
                items.push(ChatItem::text(text.clone()));
            }

            if let Some(ref data) = part.inline_data {
                items.push(ChatItem::image(ImageSource::Data {
                    mime_type: data.mime_type.clone(),
                    data: data.data.clone(),
                }));
            }

            if let Some(ref fc) = part.function_call {
                items.push(ChatItem::FunctionCall(FunctionCall {
                    id: format!("tc_{}", calls),
                    name: fc.name.clone(),
                    arguments: fc.args.clone(),
                }));
                calls += 1;
            }
        }

        if let Some(usage) = &response.usage_metadata {
            debug!(
                prompt = usage.prompt_token_count.unwrap_or(0),
                completion = usage.candidates_token_count.unwrap_or(0),
                total = usage.total_token_count.unwrap_or(0),
                finish_reason = candidate.finish_reason.as_deref().unwrap_or("stop"),
                "gemini usage"
            );
        }

        Ok(ChatMessage::new(Role::Assistant, items))
    }
}

fn convert_item(item: &ChatItem) -> Value {
    match item {
        ChatItem::Text { text } => json!({"text": text}),
        ChatItem::Image { source: ImageSource::Data { mime_type, data } } => json!({
            "inlineData": {"mimeType": mime_type, "data": data}
        }),
        ChatItem::Image { source: ImageSource::Url { url } } => json!({
            "fileData": {"mimeType": guess_mime_type(url.path()), "fileUri": url.as_str()}
        }),
        ChatItem::FunctionCall(call) => json!({
            "functionCall": {"name": call.name, "args": call.arguments}
        }),
        ChatItem::FunctionResult(result) => json!({
            "functionResponse": {
                "name": result.name,
                "response": {"result": result.result}
            }
        }),
    }
}

fn guess_mime_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

/// Request-level system text plus any system-role messages.
fn system_instruction(request: &ChatRequest) -> Option<String> {
    let parts: Vec<String> = request
        .system
        .iter()
        .cloned()
        .chain(
            request
                .messages
                .iter()
                .filter(|m| m.role == Role::System)
                .map(ChatMessage::text),
        )
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

fn convert_tools(tools: &[ToolDefinition]) -> Option<Value> {
    if tools.is_empty() {
        return None;
    }

    let function_declarations: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters
            })
        })
        .collect();

    Some(json!([{
        "functionDeclarations": function_declarations
    }]))
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatMessage> {
        let body = self.build_request(request);
        debug!(model = %self.model, messages = request.messages.len(), "gemini request");

        let response = self.client.post(self.build_url()).json(&body).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(Error::Llm(format!("Gemini API error: {error_text}")));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        self.parse_response(&gemini_response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
