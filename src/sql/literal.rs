//! SQL literal quoting for statements sent as plain text
//!
//! The query endpoint accepts a single SQL string and has no bind
//! parameters, so every value is embedded as a literal:
//! - short metadata goes through [`quote_literal`] (`'` doubled)
//! - page and chunk text goes through [`dollar_quote`], whose tag is chosen
//!   so that it never occurs inside the content

use crate::parse::sanitize_text;

/// Base name of the dollar-quote tag
pub const DOLLAR_TAG_BASE: &str = "body";

/// Single-quoted literal with embedded quotes doubled
pub fn quote_literal(value: &str) -> String {
    let clean = sanitize_text(Some(value));
    format!("'{}'", clean.replace('\'', "''"))
}

/// `null` or a single-quoted literal
pub fn optional_literal(value: Option<&str>) -> String {
    match value {
        Some(v) => quote_literal(v),
        None => "null".to_string(),
    }
}

/// Dollar-quoted literal for arbitrary text
pub fn dollar_quote(value: &str) -> String {
    let clean = sanitize_text(Some(value));
    let tag = dollar_tag_for(&clean);
    format!("{tag}{clean}{tag}")
}

/// Pick `$body$`, `$body_1$`, `$body_2$`, ... until the tag cannot be
/// confused with the content
pub fn dollar_tag_for(content: &str) -> String {
    let mut tag = format!("${}$", DOLLAR_TAG_BASE);
    let mut counter = 0;
    while collides(content, &tag) {
        counter += 1;
        tag = format!("${}_{}$", DOLLAR_TAG_BASE, counter);
    }
    tag
}

/// The closing tag must first appear right after the content. This also
/// catches content ending in a prefix of the tag, e.g. `...$body`.
fn collides(content: &str, tag: &str) -> bool {
    let closed = format!("{content}{tag}");
    closed.find(tag) != Some(content.len())
}
