//! Paragraph-aware text chunking
//!
//! Paragraphs are packed greedily into chunks of at most `max_chars`
//! characters. A paragraph that is longer than `max_chars` on its own is cut
//! into fixed windows that step back by `overlap_chars` between windows.
//! Lengths are counted in characters, never bytes.

mod boundaries;

pub use boundaries::*;

use crate::config::ChunkConfig;

/// Split text into ordered chunks
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in split_paragraphs(text, config.paragraphs) {
        let len = paragraph.chars().count();

        if current_len + len + 1 <= config.max_chars {
            if current.is_empty() {
                current.push_str(paragraph);
                current_len = len;
            } else {
                current.push('\n');
                current.push_str(paragraph);
                current_len += len + 1;
            }
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if len <= config.max_chars {
            current.push_str(paragraph);
            current_len = len;
        } else {
            chunks.extend(split_windows(paragraph, config.max_chars, config.overlap_chars));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Cut a single oversized paragraph into overlapping fixed-size windows.
///
/// The next window starts `overlap` characters before the previous end when
/// that still moves forward, otherwise at the previous end.
pub fn split_windows(paragraph: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    let total = chars.len();
    let mut windows = Vec::new();

    if max_chars == 0 {
        return windows;
    }

    let mut start = 0;
    while start < total {
        let end = (start + max_chars).min(total);
        windows.push(chars[start..end].iter().collect());

        if end == total {
            break;
        }

        start = match end.checked_sub(overlap) {
            Some(next) if next > start => next,
            _ => end,
        };
    }

    windows
}
