//! Pulls a JSON value out of free-form model output.
//!
//! Models regularly wrap their answer in a markdown fence or add a sentence of
//! preamble. Each cleanup step below is best-effort; only the final parse can
//! fail. The brace slice is a heuristic (first `{` to last `}`), so prose that
//! itself contains braces before the real object will defeat it.

use serde_json::Value;

use super::error::RecoveryError;

const FENCE: &str = "```";

pub fn recover(raw: &str) -> Result<Value, RecoveryError> {
    let cleaned = clean(raw);
    serde_json::from_str::<Value>(&cleaned).map_err(|e| {
        log::warn!("model output did not parse as JSON: {}", e);
        log::debug!("raw model output that failed parsing: {}", raw);
        RecoveryError::Malformed { raw: raw.to_string(), reason: e.to_string() }
    })
}

// All cleanup steps, in order, without the final parse.
pub(crate) fn clean(raw: &str) -> String {
    let text = raw.trim();
    let text = strip_fence(text);
    let text = slice_outer_braces(text);
    strip_control_chars(text)
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix(FENCE) else { return text };
    let Some(inner) = rest.strip_suffix(FENCE) else { return text };
    // Optional language tag right after the opening fence (```json, ```JSON5, ...)
    let tag_len = inner
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')))
        .map(|(i, _)| i)
        .unwrap_or(inner.len());
    &inner[tag_len..]
}

fn slice_outer_braces(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(first), Some(last)) if first < last => &text[first..=last],
        _ => text,
    }
}

// Newline, carriage return and tab may sit inside string values (embedded code).
fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}
