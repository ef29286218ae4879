//! Text sanitizing for extracted page text
//!
//! Everything that reaches the chunker or the SQL layer passes through
//! [`sanitize_text`] or [`sanitize_bytes`] first:
//! - `\r\n` and lone `\r` become `\n`
//! - ASCII control characters other than `\n` and `\t` are removed
//! - invalid UTF-8 sequences are dropped (byte input only)

mod text;

pub use text::*;

/// Sanitize optional text, returning an empty string for `None`
pub fn sanitize_text(value: Option<&str>) -> String {
    match value {
        Some(text) if !text.is_empty() => strip_controls(&normalize_line_endings(text)),
        _ => String::new(),
    }
}

/// Sanitize raw bytes, dropping any invalid UTF-8 sequences
pub fn sanitize_bytes(bytes: &[u8]) -> String {
    let decoded: String = bytes.utf8_chunks().map(|chunk| chunk.valid()).collect();
    sanitize_text(Some(&decoded))
}

/// Normalize line endings to `\n`
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Whether a character is one of the control characters we strip
fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}')
}

fn strip_controls(text: &str) -> String {
    text.chars().filter(|c| !is_stripped_control(*c)).collect()
}
