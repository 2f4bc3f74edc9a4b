//! Best-effort JSON recovery from model replies.
//!
//! Models wrap their answer in prose or markdown fences often enough that a strict
//! parse is only the first attempt: after that a fenced code block is tried, then
//! the first balanced `{...}` span in the text.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::Result;

/// Parses `raw` as `T`, trying each recovery strategy in turn.
pub fn extract<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    let first_error = match serde_json::from_str(trimmed) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    let candidates = [fenced_block(trimmed), balanced_object(trimmed)];
    for candidate in candidates.into_iter().flatten() {
        if let Ok(value) = serde_json::from_str(candidate) {
            return Ok(value);
        }
    }

    Err(first_error.into())
}

/// Like [`extract`], returning `fallback` (and logging) when nothing parses.
pub fn extract_or<T: DeserializeOwned>(raw: &str, fallback: T) -> T {
    match extract(raw) {
        Ok(value) => value,
        Err(err) => {
            let preview: String = raw.chars().take(200).collect();
            warn!(error = %err, preview = %preview, "Model reply is not valid JSON, using default payload");
            fallback
        }
    }
}

/// Contents of the first ```json fence, or else the first ``` fence.
fn fenced_block(text: &str) -> Option<&str> {
    let (start, marker_len) = match text.find("```json") {
        Some(idx) => (idx, "```json".len()),
        None => (text.find("```")?, "```".len()),
    };
    let body = &text[start + marker_len..];
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

/// First `{...}` span whose braces balance, ignoring braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
