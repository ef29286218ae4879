//! Page sources
//!
//! A [`PageSource`] turns one input (a folder of page scans or a PDF) into a
//! numbered list of pages and produces the text of each page on demand. The
//! ingest driver only decides *whether* a page needs text; the source decides
//! *how* to get it.

mod images;
mod ocr;
mod pdf;

pub use images::*;
pub use ocr::*;
pub use pdf::*;

use crate::error::Result;
use crate::store::SourceType;
use async_trait::async_trait;
use serde_json::Value;

/// One input page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePage {
    /// 1-based position within the material
    pub page_no: u32,

    /// URI stored with the page row
    pub image_uri: String,

    /// Short name used in log lines
    pub label: String,
}

#[async_trait]
pub trait PageSource: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Pages in ascending page order
    fn pages(&self) -> &[SourcePage];

    /// Metadata stored on a newly created material
    fn metadata(&self) -> Value;

    /// Whether a stored page may also be recognized by its image URI
    fn match_by_uri(&self) -> bool {
        false
    }

    /// Whether [`PageSource::extract`] calls a remote service
    fn calls_remote(&self) -> bool {
        false
    }

    /// Text of one page, sanitized and trimmed
    async fn extract(&self, page: &SourcePage) -> Result<String>;
}
