use std::fmt::Write as _;

use crate::error::BridgeError;
use crate::protocol::openai_chat::{OpenAiTool, OpenAiToolChoice};

const TOOLS_PLACEHOLDER: &str = "{tools}";

// ---------------------------------------------------------------------------
// Tool list formatting
// ---------------------------------------------------------------------------

fn format_param_detail(p_name: &str, p_info: &serde_json::Value, required: &[&str]) -> String {
    let p_type = p_info
        .get("type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("any");
    let is_required = if required.contains(&p_name) {
        "Yes"
    } else {
        "No"
    };

    let mut out = format!("- {p_name}:\n  - type: {p_type}\n  - required: {is_required}");
    if let Some(desc) = p_info.get("description").and_then(serde_json::Value::as_str) {
        let _ = write!(out, "\n  - description: {desc}");
    }
    if let Some(values) = p_info.get("enum") {
        let _ = write!(out, "\n  - enum: {values}");
    }
    if let Some(default) = p_info.get("default") {
        let _ = write!(out, "\n  - default: {default}");
    }
    out
}

/// Render tool definitions as the numbered list embedded in the system prompt.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidRequest`] when a tool schema is malformed.
fn format_tools_list(tools: &[OpenAiTool]) -> Result<String, BridgeError> {
    let mut blocks = Vec::with_capacity(tools.len());

    for (i, tool) in tools.iter().enumerate() {
        let func = &tool.function;
        let name = func.name.trim();
        if name.is_empty() {
            return Err(BridgeError::InvalidRequest(format!(
                "tools[{i}].function.name cannot be empty"
            )));
        }

        let schema = func.parameters.as_ref();
        let props = match schema.and_then(|s| s.get("properties")) {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Object(map)) => Some(map),
            Some(_) => {
                return Err(BridgeError::InvalidRequest(format!(
                    "Tool '{name}': 'properties' must be an object"
                )));
            }
        };
        let required: Vec<&str> = match schema.and_then(|s| s.get("required")) {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let Some(key) = item.as_str() else {
                        return Err(BridgeError::InvalidRequest(format!(
                            "Tool '{name}': 'required' entries must be strings, got {item}"
                        )));
                    };
                    out.push(key);
                }
                out
            }
            Some(_) => {
                return Err(BridgeError::InvalidRequest(format!(
                    "Tool '{name}': 'required' must be a list"
                )));
            }
        };

        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| props.is_none_or(|map| !map.contains_key(*key)))
            .collect();
        if !missing.is_empty() {
            return Err(BridgeError::InvalidRequest(format!(
                "Tool '{name}': required parameters {missing:?} are not defined in properties"
            )));
        }

        let details = props.map_or_else(
            || "(no parameters)".to_string(),
            |map| {
                if map.is_empty() {
                    "(no parameters)".to_string()
                } else {
                    map.iter()
                        .map(|(p_name, p_info)| format_param_detail(p_name, p_info, &required))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            },
        );
        let description = func
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or("None");

        blocks.push(format!(
            "{idx}. {name}\n   Description: {description}\n   Parameters:\n{details}",
            idx = i + 1,
        ));
    }

    Ok(blocks.join("\n\n"))
}

// ---------------------------------------------------------------------------
// Default prompt template
// ---------------------------------------------------------------------------

const DEFAULT_PROMPT_TEMPLATE: &str = r#"You can call the following tools to help answer the user:

{tools}

When you decide to call one or more tools, reply with ONLY a fenced JSON block in exactly this shape and nothing after it:

```json
{"tool_calls": [{"id": "call_1", "type": "function", "function": {"name": "TOOL_NAME", "arguments": {"param": "value"}}}]}
```

Rules:
1. Use tool names exactly as listed above.
2. "arguments" must be a JSON object containing every required parameter, with keys spelled exactly as defined.
3. Put every call of this turn in the same "tool_calls" array.
4. Tool results from earlier calls appear in the conversation as "Tool execution result" messages; do not repeat a call whose result you already have.
5. If no tool is needed, answer normally without any JSON block."#;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build the tool-calling system prompt.
///
/// `custom_template` replaces the default and must contain `{tools}`.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidRequest`] when a tool schema is malformed or
/// the template lacks the `{tools}` placeholder.
pub fn generate_tool_prompt(
    tools: &[OpenAiTool],
    tool_choice: Option<&OpenAiToolChoice>,
    custom_template: Option<&str>,
) -> Result<String, BridgeError> {
    let template = custom_template.unwrap_or(DEFAULT_PROMPT_TEMPLATE);
    if !template.contains(TOOLS_PLACEHOLDER) {
        return Err(BridgeError::InvalidRequest(
            "tool prompt template must contain {tools}".to_string(),
        ));
    }
    let prompt = template.replace(TOOLS_PLACEHOLDER, &format_tools_list(tools)?);

    let prompt = match tool_choice {
        Some(OpenAiToolChoice::Mode(mode)) if mode == "required" => {
            format!("{prompt}\n\nYou MUST call at least one tool.")
        }
        Some(OpenAiToolChoice::Function(choice)) => {
            format!("{prompt}\n\nYou MUST call the tool: {}", choice.function.name)
        }
        _ => prompt,
    };
    Ok(prompt)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
