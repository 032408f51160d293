//! Reading fields out of decoded chat-completion chunk events.
//!
//! Payloads are navigated as `serde_json::Value` so that syntactically valid
//! JSON with an unexpected shape is simply ignored instead of being mistaken
//! for a truncated line.

use serde_json::Value;

/// Returns `choices[0].delta.content` when it is a non-empty string.
pub fn delta_content(value: &Value) -> Option<&str> {
    first_choice(value)?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|text| !text.is_empty())
}

/// Returns `choices[0].finish_reason` when the producer sets one.
pub fn finish_reason(value: &Value) -> Option<&str> {
    first_choice(value)?
        .get("finish_reason")
        .and_then(Value::as_str)
}

fn first_choice(value: &Value) -> Option<&Value> {
    value.get("choices")?.as_array()?.first()
}
