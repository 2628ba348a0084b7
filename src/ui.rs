//! Console rendering helpers.

use std::io::Write;
use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use terminal_size::{terminal_size, Height, Width};

use crate::message::convert::{TOOL_CALLS_KEY, TOOL_RESULTS_KEY};
use crate::message::{ChatItem, Content, Envelope, Part};

const MAX_RULE_WIDTH: usize = 80;

fn rule() -> String {
    let (width, _) = terminal_size().unwrap_or((Width(MAX_RULE_WIDTH as u16), Height(24)));
    "─".repeat((width.0 as usize).min(MAX_RULE_WIDTH))
}

/// Human-readable rendering of an envelope.
pub fn render_envelope(envelope: &Envelope) -> String {
    let mut lines = Vec::new();
    let header = format!("Message from {}", envelope.sender());
    lines.push(header.yellow().bold().to_string());
    lines.push(rule().black().bold().to_string());

    match envelope.content() {
        Content::Text(m) => lines.push(m.text.clone()),
        Content::Chat(m) => lines.extend(m.items.iter().map(render_item)),
        Content::Chunk(c) => lines.extend(c.items.iter().map(render_item)),
        Content::MultiModal(m) => lines.extend(m.parts.iter().map(|p| match p {
            Part::Text { text } => text.clone(),
            Part::Image { source } => format!("{} {}", "[image]".cyan(), source.describe()),
        })),
    }

    // Tool traffic the payload could not hold.
    for key in [TOOL_CALLS_KEY, TOOL_RESULTS_KEY] {
        if let Some(value) = envelope.metadata().get(key) {
            lines.push(format!("{} {}", format!("[{key}]").magenta(), value));
        }
    }

    lines.push(rule().black().bold().to_string());
    lines.join("\n")
}

fn render_item(item: &ChatItem) -> String {
    match item {
        ChatItem::Text { text } => text.clone(),
        ChatItem::Image { source } => format!("{} {}", "[image]".cyan(), source.describe()),
        ChatItem::FunctionCall(call) => format!(
            "{} {}({})",
            "[tool call]".magenta(),
            call.name,
            call.arguments
        ),
        ChatItem::FunctionResult(result) => format!(
            "{} {} -> {}",
            "[tool result]".magenta(),
            result.name,
            result.result
        ),
    }
}

pub fn print_envelope(envelope: &Envelope) {
    println!("{}", render_envelope(envelope));
}

/// Header printed before the first chunk of a streamed reply.
pub fn print_stream_header(sender: &str) {
    println!("{}", format!("Message from {}", sender).yellow().bold());
    println!("{}", rule().black().bold());
}

/// Print a streamed delta without a trailing newline.
pub fn print_delta(text: &str) {
    print!("{}", text);
    std::io::stdout().flush().ok();
}

/// Spinner shown while waiting on an agent.
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("  {spinner:.magenta} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChatMessage, FunctionCall, TextMessage};
    use serde_json::json;

    #[test]
    fn test_render_text_envelope() {
        let env = Envelope::wrap(TextMessage::assistant("[Light is now on]"), "assistant");
        let rendered = render_envelope(&env);
        assert!(rendered.contains("assistant"));
        assert!(rendered.contains("[Light is now on]"));
    }

    #[test]
    fn test_render_tool_call() {
        let env = Envelope::wrap(
            ChatMessage::assistant("").with_item(ChatItem::FunctionCall(FunctionCall {
                id: "tc_0".to_string(),
                name: "change_state".to_string(),
                arguments: json!({"new_state": true}),
            })),
            "assistant",
        );
        let rendered = render_envelope(&env);
        assert!(rendered.contains("change_state"));
        assert!(rendered.contains("new_state"));
    }
}
