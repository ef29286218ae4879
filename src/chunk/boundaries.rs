//! Paragraph boundary detection for chunking

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

static BLANK_LINES: OnceLock<Regex> = OnceLock::new();

fn blank_lines() -> &'static Regex {
    BLANK_LINES.get_or_init(|| Regex::new(r"\n{2,}").expect("static regex"))
}

/// How a page's text is cut into paragraphs before chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParagraphMode {
    /// Blocks separated by one or more blank lines (OCR output)
    #[default]
    BlankLines,
    /// Every line is its own paragraph (PDF text layers wrap hard)
    Lines,
}

/// Split text into trimmed, non-empty paragraphs
pub fn split_paragraphs(text: &str, mode: ParagraphMode) -> Vec<&str> {
    let pieces: Vec<&str> = match mode {
        ParagraphMode::BlankLines => blank_lines().split(text).collect(),
        ParagraphMode::Lines => text.lines().collect(),
    };

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}
