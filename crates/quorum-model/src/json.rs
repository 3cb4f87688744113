//! Helpers for extracting JSON from model output. Models wrap payloads in
//! markdown fences, preambles, and trailing commentary; these slice out the
//! outermost JSON fragment before handing it to serde.

/// Strip a leading/trailing markdown code fence (``` or ```json) if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Slice the outermost `{ … }` object from the text, if any.
pub fn extract_object(text: &str) -> Option<&str> {
    let text = strip_code_fences(text);
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Slice the outermost `[ … ]` array from the text, if any.
pub fn extract_array(text: &str) -> Option<&str> {
    let text = strip_code_fences(text);
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}
