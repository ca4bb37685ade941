//! String utilities for log output.

/// Shorten `text` to at most `max_chars` characters, marking the cut with `...`
///
/// Counts characters, not bytes, so multi-byte text is never split mid-char.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}...", &text[..cut]),
    }
}
