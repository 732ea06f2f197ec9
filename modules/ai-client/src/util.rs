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

/// Body of the first fenced code block anywhere in `text`, language tag
/// dropped. `None` when there is no closed fence.
pub fn extract_code_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = text[start + 3..].trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let end = after.find("```")?;
    Some(after[..end].trim())
}

/// Return the widest `open ... close` span in `text`, e.g. the outermost
/// `[...]` of a JSON array embedded in chatty model output.
pub fn extract_json_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}
