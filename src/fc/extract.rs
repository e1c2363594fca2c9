//! Recovery of tool invocations embedded as JSON in model text.
//!
//! Three strategies run in order and the first one that yields at least one
//! valid invocation wins:
//!
//! 1. fenced ```` ```json ```` blocks,
//! 2. brace-balanced inline JSON objects,
//! 3. a natural-language `调用函数: NAME 参数: {...}` /
//!    `call function: NAME arguments: {...}` phrase.
//!
//! The structural strategies (1 and 2) share one predicate with
//! [`strip_tool_json`], so stripping removes exactly what extraction accepts.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::Value;

use crate::protocol::openai_chat::{OpenAiToolCall, OpenAiToolCallFunction};
use crate::util::next_call_id;

/// A recovered function invocation. `function.arguments` is always a JSON string.
pub type ToolInvocation = OpenAiToolCall;

static FENCED_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?i:json)[ \t]*(.*?)```").expect("valid fenced json regex")
});
static NATURAL_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:调用函数|(?i:call function))\s*[:：]\s*([A-Za-z0-9_.\-]+)\s*(?:参数|(?i:arguments))\s*[:：]\s*",
    )
    .expect("valid natural call regex")
});

/// Extract tool invocations from the first `scan_limit` bytes of `text`.
///
/// Returns `None` when no strategy recovers a valid invocation; never returns
/// an empty list.
#[must_use]
pub fn extract_tool_invocations(text: &str, scan_limit: usize) -> Option<Vec<ToolInvocation>> {
    let window = scan_window(text, scan_limit);
    extract_from_fenced_blocks(window)
        .or_else(|| extract_from_balanced_json(window))
        .or_else(|| extract_from_natural_language(window))
}

/// Remove tool-call JSON from `text`, keep everything else, and trim.
///
/// Valid fenced blocks are removed first, then valid brace-balanced objects
/// outside them. Only matches inside the first `scan_limit` bytes are
/// considered, as in [`extract_tool_invocations`].
#[must_use]
pub fn strip_tool_json(text: &str, scan_limit: usize) -> String {
    let window = scan_window(text, scan_limit);
    let mut spans: Vec<(usize, usize)> = FENCED_JSON_RE
        .captures_iter(window)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let body = caps.get(1)?;
            tool_calls_from_json(body.as_str()).map(|_| (whole.start(), whole.end()))
        })
        .collect();

    let fenced = spans.clone();
    let mut pos = 0usize;
    while let Some((start, end)) = next_balanced_candidate(window, pos) {
        if let Some(&(_, fence_end)) = fenced.iter().find(|(s, e)| start >= *s && start < *e) {
            pos = fence_end;
            continue;
        }
        if tool_calls_from_json(&window[start..end]).is_some() {
            spans.push((start, end));
            pos = end;
        } else {
            pos = start + 1;
        }
    }

    if spans.is_empty() {
        return text.trim().to_string();
    }
    spans.sort_unstable();

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for (start, end) in spans {
        if start < cursor {
            continue;
        }
        out.push_str(&text[cursor..start]);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out.trim().to_string()
}

/// Largest prefix of `text` no longer than `limit` bytes that ends on a char boundary.
fn scan_window(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ---------------------------------------------------------------------------
// Strategy 1: fenced blocks
// ---------------------------------------------------------------------------

fn extract_from_fenced_blocks(window: &str) -> Option<Vec<ToolInvocation>> {
    FENCED_JSON_RE
        .captures_iter(window)
        .find_map(|caps| tool_calls_from_json(caps.get(1)?.as_str()))
}

// ---------------------------------------------------------------------------
// Strategy 2: brace-balanced scan
// ---------------------------------------------------------------------------

fn extract_from_balanced_json(window: &str) -> Option<Vec<ToolInvocation>> {
    let mut pos = 0usize;
    while let Some((start, end)) = next_balanced_candidate(window, pos) {
        if let Some(calls) = tool_calls_from_json(&window[start..end]) {
            return Some(calls);
        }
        pos = start + 1;
    }
    None
}

/// Find the next `{` at or after `from` whose object closes inside `text`.
///
/// Returns the byte span `[start, end)` of the candidate. Openings that never
/// close are skipped.
fn next_balanced_candidate(text: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut start = from;
    while start < bytes.len() {
        let rel = memchr::memchr(b'{', &bytes[start..])?;
        let open = start + rel;
        if let Some(end) = balanced_object_end(bytes, open) {
            return Some((open, end));
        }
        start = open + 1;
    }
    None
}

/// Given `bytes[open] == b'{'`, return the exclusive end of the balanced object.
///
/// Braces inside string literals are ignored; a backslash escapes exactly the
/// next byte.
pub(crate) fn balanced_object_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[open..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Strategy 3: natural-language phrase
// ---------------------------------------------------------------------------

fn extract_from_natural_language(window: &str) -> Option<Vec<ToolInvocation>> {
    NATURAL_CALL_RE.captures_iter(window).find_map(|caps| {
        let name = caps.get(1)?.as_str();
        let args_start = caps.get(0)?.end();
        if window.as_bytes().get(args_start) != Some(&b'{') {
            return None;
        }
        let args_end = balanced_object_end(window.as_bytes(), args_start)?;
        let args: Value = serde_json::from_str(&window[args_start..args_end]).ok()?;
        Some(vec![ToolInvocation {
            id: next_call_id(),
            type_: "function".to_string(),
            function: OpenAiToolCallFunction {
                name: name.to_string(),
                arguments: args.to_string(),
            },
        }])
    })
}

// ---------------------------------------------------------------------------
// Shared predicate
// ---------------------------------------------------------------------------

/// Parse `candidate` and return its normalized `tool_calls`, if it has any valid one.
fn tool_calls_from_json(candidate: &str) -> Option<Vec<ToolInvocation>> {
    let candidate = candidate.trim();
    if !candidate.contains("tool_calls") {
        return None;
    }
    let value: Value = serde_json::from_str(candidate).ok()?;
    let entries = value.get("tool_calls")?.as_array()?;
    let calls: Vec<ToolInvocation> = entries.iter().filter_map(normalize_invocation).collect();
    if calls.is_empty() {
        None
    } else {
        Some(calls)
    }
}

fn normalize_invocation(entry: &Value) -> Option<ToolInvocation> {
    let entry = entry.as_object()?;
    let function = match entry.get("function") {
        Some(Value::Object(function)) => function,
        _ => entry,
    };
    let name = function.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let arguments = match function.get("arguments") {
        Some(Value::String(raw)) => raw.clone(),
        None | Some(Value::Null) => "{}".to_string(),
        Some(other) => other.to_string(),
    };
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map_or_else(next_call_id, str::to_string);
    Some(ToolInvocation {
        id,
        type_: "function".to_string(),
        function: OpenAiToolCallFunction {
            name: name.to_string(),
            arguments,
        },
    })
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
