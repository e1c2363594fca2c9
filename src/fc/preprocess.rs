use std::collections::HashMap;

use crate::protocol::openai_chat::{OpenAiMessage, OpenAiToolCall};
use crate::protocol::upstream::request::{content_to_text, UpstreamMessage};

/// Build an index mapping `tool_call_id` -> (name, `arguments_json`) from
/// assistant messages in the conversation history.
fn build_tool_call_index(messages: &[OpenAiMessage]) -> HashMap<&str, (&str, &str)> {
    let mut index = HashMap::new();
    for msg in messages.iter().filter(|m| m.role == "assistant") {
        for call in msg.tool_calls.iter().flatten() {
            index.insert(
                call.id.as_str(),
                (call.function.name.as_str(), call.function.arguments.as_str()),
            );
        }
    }
    index
}

/// Render prior assistant tool calls the way the model is asked to emit them.
fn format_tool_calls_block(calls: &[OpenAiToolCall]) -> String {
    let payload = serde_json::json!({ "tool_calls": calls });
    format!("```json\n{payload}\n```")
}

/// Flatten an `OpenAI` conversation into the plain-text messages the upstream accepts.
///
/// - `tool` messages become `user` messages describing the execution result.
/// - Assistant `tool_calls` are appended to the text as a fenced JSON block.
/// - `developer` messages become `system` messages.
/// - Content part arrays are reduced to their text.
#[must_use]
pub fn preprocess_messages(messages: &[OpenAiMessage]) -> Vec<UpstreamMessage> {
    let tool_call_index = build_tool_call_index(messages);
    let mut result = Vec::with_capacity(messages.len() + 1);

    for msg in messages {
        let text = content_to_text(msg.content.as_ref());
        match msg.role.as_str() {
            "tool" => {
                let tool_call_id = msg.tool_call_id.as_deref().unwrap_or("");
                let (tool_name, tool_arguments) = tool_call_index
                    .get(tool_call_id)
                    .copied()
                    .unwrap_or_else(|| (msg.name.as_deref().unwrap_or("unknown"), "{}"));
                let formatted = format!(
                    "Tool execution result:\n\
                     - Tool name: {tool_name}\n\
                     - Tool arguments: {tool_arguments}\n\
                     - Execution result:\n\
                     <tool_result>\n\
                     {text}\n\
                     </tool_result>"
                );
                result.push(UpstreamMessage::new("user", formatted));
            }
            "assistant" => match msg.tool_calls.as_deref() {
                Some(calls) if !calls.is_empty() => {
                    let block = format_tool_calls_block(calls);
                    let content = if text.trim().is_empty() {
                        block
                    } else {
                        format!("{}\n{block}", text.trim_end())
                    };
                    result.push(UpstreamMessage::new("assistant", content));
                }
                _ => result.push(UpstreamMessage::new("assistant", text)),
            },
            "developer" => result.push(UpstreamMessage::new("system", text)),
            role => result.push(UpstreamMessage::new(role, text)),
        }
    }

    result
}

/// Put the tool prompt in front of the conversation.
///
/// A leading system message gets the prompt appended; otherwise a new system
/// message is inserted first.
pub fn inject_tool_prompt(messages: &mut Vec<UpstreamMessage>, tool_prompt: &str) {
    match messages.first_mut() {
        Some(first) if first.role == "system" => {
            if !first.content.is_empty() {
                first.content.push_str("\n\n");
            }
            first.content.push_str(tool_prompt);
        }
        _ => messages.insert(0, UpstreamMessage::new("system", tool_prompt)),
    }
}
