//! PDF documents with an embedded text layer

use super::{PageSource, SourcePage};
use crate::error::{Error, Result};
use crate::parse::sanitize_text;
use crate::store::SourceType;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug, warn};

/// Extract the text of every page in page order
///
/// Each page is sanitized and trimmed. Pages without text come back as empty
/// strings so page numbers stay aligned with the document.
pub fn extract_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Pdf(format!("Failed to read '{}': {}", path.display(), e)))?;

    // pdf_extract panics on some malformed documents
    let result = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
    }));

    let raw = match result {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => {
            return Err(Error::Pdf(format!("{}: {}", path.display(), e)));
        }
        Err(_) => {
            return Err(Error::Pdf(format!(
                "{}: extraction panicked (malformed PDF)",
                path.display()
            )));
        }
    };

    let pages: Vec<String> = raw
        .iter()
        .map(|page| sanitize_text(Some(page)).trim().to_string())
        .collect();

    let with_text = pages.iter().filter(|p| !p.is_empty()).count();
    if with_text == 0 {
        return Err(Error::EmptyPdf(path.display().to_string()));
    }
    if with_text < pages.len() {
        warn!(
            "{} of {} pages in {} have no text layer",
            pages.len() - with_text,
            pages.len(),
            path.display()
        );
    }

    debug!("Extracted {} pages from {}", pages.len(), path.display());
    Ok(pages)
}

/// Pages of a PDF, extracted up front
pub struct PdfDocument {
    pages: Vec<SourcePage>,
    texts: Vec<String>,
}

impl PdfDocument {
    /// Extract `path`; every page is stored under the material's source URI
    pub fn open(path: &Path, source_uri: &str) -> Result<Self> {
        Self::from_texts(extract_pdf_pages(path)?, source_uri)
    }

    /// Build a document from already extracted page texts
    pub fn from_texts(texts: Vec<String>, source_uri: &str) -> Result<Self> {
        let pages = (1..=texts.len())
            .map(|n| {
                let page_no = u32::try_from(n)
                    .map_err(|_| Error::Other("too many pages in one PDF".to_string()))?;
                Ok(SourcePage {
                    page_no,
                    image_uri: source_uri.to_string(),
                    label: format!("page {}", page_no),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { pages, texts })
    }
}

#[async_trait]
impl PageSource for PdfDocument {
    fn source_type(&self) -> SourceType {
        SourceType::Pdf
    }

    fn pages(&self) -> &[SourcePage] {
        &self.pages
    }

    fn metadata(&self) -> Value {
        json!({ "pages": self.pages.len() })
    }

    async fn extract(&self, page: &SourcePage) -> Result<String> {
        (page.page_no as usize)
            .checked_sub(1)
            .and_then(|idx| self.texts.get(idx))
            .cloned()
            .ok_or_else(|| Error::Other(format!("No text for page {}", page.page_no)))
    }
}
