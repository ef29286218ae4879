//! Plain text helpers used around chunk storage

/// Strip every non-ASCII character and trim the result.
///
/// Used as the last-resort payload when the remote store rejects a chunk.
pub fn ascii_fallback(text: &str) -> String {
    let ascii: String = text.chars().filter(char::is_ascii).collect();
    ascii.trim().to_string()
}

/// Single-line preview of at most `max_chars` characters for log output
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars()
        .take(max_chars)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}
