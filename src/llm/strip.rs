//! Fence stripping for model output.
//!
//! Models wrap code in markdown fences, stray backticks, or HTML-escaped
//! text depending on backend and mood. `strip` extracts the content of all
//! complete fenced blocks in order (joined by a blank line); when no
//! complete fence pair exists it removes stray backticks and unescapes HTML
//! entities instead. Pure function, no I/O.

use std::sync::OnceLock;

use regex::Regex;

/// A fenced block: ``` with an optional language tag, content, closing ```.
fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"```[A-Za-z0-9_+.-]*[ \t]*\r?\n?((?s:.*?))```").unwrap()
    })
}

/// Extract code/text content from fenced or backticked wrapping.
///
/// Idempotent: extraction output contains no fence pair, and the no-fence
/// branch is stable for backtick-free, entity-free text.
pub fn strip(text: &str) -> String {
    let t = text.trim();
    if t.is_empty() {
        return String::new();
    }

    let blocks: Vec<&str> = fence_re()
        .captures_iter(t)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_matches(['\n', '\r']))
        .collect();

    let result = if blocks.is_empty() {
        unescape_html(&t.replace('`', ""))
    } else {
        blocks.join("\n\n")
    };

    result.replace("\r\n", "\n").trim().to_string()
}

/// Undo HTML entity escaping some backends apply to generated text.
/// `&amp;` last, so already-unescaped text is left alone.
fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
