use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;

/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code blocks from a response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Extract one JSON object from free-form model output and deserialize it.
///
/// Models wrap JSON in prose and code fences; this scans from the first `{`
/// to the last `}` after stripping fences, then validates the shape through
/// the target type. Callers treat a failure like any other generation
/// failure and fall back.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let cleaned = strip_code_blocks(text);

    if let Ok(value) = serde_json::from_str(cleaned) {
        return Ok(value);
    }

    let start = cleaned
        .find('{')
        .context("no JSON object found in response")?;
    let end = cleaned
        .rfind('}')
        .filter(|&end| end > start)
        .context("unterminated JSON object in response")?;

    serde_json::from_str(&cleaned[start..=end])
        .map_err(|e| anyhow!("response JSON does not match expected shape: {e}"))
}
