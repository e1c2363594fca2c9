//! Normalization of upstream reasoning markup.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::config::ThinkingMode;

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<summary>.*?</summary>").expect("valid summary regex")
});
static DETAILS_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<details[^>]*>").expect("valid details regex")
});
static QUOTE_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:> )+").expect("valid quote regex")
});

const MARKER_TOKENS: [&str; 3] = ["</thinking>", "<Full>", "</Full>"];
const DETAILS_CLOSE: &str = "</details>";

/// Normalize reasoning text for display under `mode`.
///
/// Removes `<summary>` regions and vendor marker tokens, rewrites or drops the
/// `<details>` wrapper, strips `"> "` quote prefixes and trims. The pass is
/// repeated until the text stops changing, so applying this function to its
/// own output is a no-op.
#[must_use]
pub fn transform_thinking_content(text: &str, mode: ThinkingMode) -> String {
    let mut current = transform_once(text, mode);
    loop {
        let next = transform_once(&current, mode);
        if next == current {
            return current;
        }
        // Every rewrite shortens the text, so this terminates.
        current = next;
    }
}

fn transform_once(text: &str, mode: ThinkingMode) -> String {
    let mut out = SUMMARY_RE.replace_all(text, "").into_owned();
    for token in MARKER_TOKENS {
        if out.contains(token) {
            out = out.replace(token, "");
        }
    }
    let mut out = out.trim().to_string();

    match mode {
        ThinkingMode::Think => {
            out = replace_details(&out, "<span>", "</span>").into_owned();
        }
        ThinkingMode::Strip => {
            out = replace_details(&out, "", "").into_owned();
        }
        ThinkingMode::Raw => {}
    }

    let out = QUOTE_PREFIX_RE.replace_all(&out, "");
    out.trim().to_string()
}

fn replace_details<'a>(text: &'a str, open: &str, close: &str) -> Cow<'a, str> {
    if !text.contains("<details") && !text.contains(DETAILS_CLOSE) {
        return Cow::Borrowed(text);
    }
    let opened = DETAILS_OPEN_RE.replace_all(text, open);
    Cow::Owned(opened.replace(DETAILS_CLOSE, close))
}
