//! Response normalization across backend envelope shapes.
//!
//! Inference backends disagree about where the answer lives. The normalizer
//! tries a fixed, ordered list of shape matchers — each a pure function from
//! payload to optional text — and returns the first hit. Extending support
//! for a new backend means adding a matcher, not touching call sites.

use serde_json::Value;

type ShapeMatcher = fn(&Value) -> Option<String>;

/// Matchers tried in order. First non-empty extraction wins.
const SHAPE_MATCHERS: &[ShapeMatcher] = &[
    response_field,
    text_field,
    message_content,
    first_choice,
];

/// Extract the model's textual answer from a raw response body.
///
/// Falls back to the serialized payload when it is valid structured data
/// that matches no known shape, and to the raw body when it is not
/// structured data at all. Returns `None` only for a genuinely empty body.
pub fn normalize(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(payload) => SHAPE_MATCHERS
            .iter()
            .find_map(|matcher| matcher(&payload))
            .or_else(|| Some(payload.to_string())),
        Err(_) => Some(raw.to_string()),
    }
}

/// Ollama `/api/generate`: `{"response": "..."}`.
fn response_field(payload: &Value) -> Option<String> {
    non_empty(payload.get("response")?.as_str()?)
}

/// Bare completion: `{"text": "..."}`.
fn text_field(payload: &Value) -> Option<String> {
    non_empty(payload.get("text")?.as_str()?)
}

/// Chat single-message: `{"message": {"content": "..."}}`.
fn message_content(payload: &Value) -> Option<String> {
    non_empty(payload.get("message")?.get("content")?.as_str()?)
}

/// OpenAI-style: `{"choices": [{"message": {"content": ...}} | {"text": ...}]}`.
fn first_choice(payload: &Value) -> Option<String> {
    let choice = payload.get("choices")?.as_array()?.first()?;
    let text = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .or_else(|| choice.get("text").and_then(Value::as_str))?;
    non_empty(text)
}

/// An empty string field counts as no match, so the fallback still surfaces
/// the payload instead of dropping it.
fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
