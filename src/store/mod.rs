//! Remote material store
//!
//! [`MaterialStore`] is the seam between the ingest driver and the database:
//! the driver only speaks in subjects, materials, pages and chunks.
//! [`RemoteStore`] implements it by sending statements to the SQL endpoint.

mod statements;

#[cfg(test)]
pub(crate) mod memory;

pub use statements::*;

use crate::chunk::ParagraphMode;
use crate::error::{Error, Result};
use crate::sql::SqlClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Kind of input a material was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Image,
    Pdf,
}

impl SourceType {
    /// Paragraph rule used when chunking text from this source
    pub fn paragraph_mode(&self) -> ParagraphMode {
        match self {
            SourceType::Image => ParagraphMode::BlankLines,
            SourceType::Pdf => ParagraphMode::Lines,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Image => write!(f, "image"),
            SourceType::Pdf => write!(f, "pdf"),
        }
    }
}

/// A material row to create
#[derive(Debug, Clone)]
pub struct NewMaterial<'a> {
    pub subject_id: &'a str,
    pub chapter: Option<&'a str>,
    pub paragraph: Option<&'a str>,
    pub title: &'a str,
    pub source_type: SourceType,
    pub source_uri: &'a str,
    pub metadata: Value,
}

/// A page row to insert or update
#[derive(Debug, Clone)]
pub struct PageRecord<'a> {
    pub material_id: &'a str,
    pub page_no: u32,
    pub image_uri: &'a str,
    pub text: &'a str,
}

/// A chunk row to insert
#[derive(Debug, Clone)]
pub struct ChunkRecord<'a> {
    pub material_id: &'a str,
    pub page_id: &'a str,
    pub chunk_index: u32,
    pub content: &'a str,
}

/// Stored state of one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingPage {
    pub page_no: u32,
    pub image_uri: Option<String>,
    pub chunk_count: u64,
}

#[async_trait]
pub trait MaterialStore: Send + Sync {
    /// Insert the subject or update its description; returns the subject id
    async fn upsert_subject(&self, name: &str, description: &str) -> Result<String>;

    /// Material id for a source URI, if one exists
    async fn find_material(&self, source_uri: &str) -> Result<Option<String>>;

    /// Create a material; returns its id
    async fn insert_material(&self, material: &NewMaterial<'_>) -> Result<String>;

    /// Every stored page of a material with its chunk count
    async fn existing_pages(&self, material_id: &str) -> Result<Vec<ExistingPage>>;

    /// Insert or update a page by (material, page_no); returns the page id
    async fn upsert_page(&self, page: &PageRecord<'_>) -> Result<String>;

    /// Remove every chunk of a page
    async fn delete_chunks(&self, page_id: &str) -> Result<()>;

    async fn insert_chunk(&self, chunk: &ChunkRecord<'_>) -> Result<()>;
}

/// [`MaterialStore`] backed by the remote SQL endpoint
pub struct RemoteStore {
    client: SqlClient,
    statements: Statements,
}

impl RemoteStore {
    pub fn new(client: SqlClient, schema: &str) -> Self {
        Self {
            client,
            statements: Statements::new(schema),
        }
    }

    async fn returning_id(&self, sql: &str, what: &str) -> Result<String> {
        let rows = self.client.execute(sql).await?;
        rows.first()
            .and_then(|row| row.get("id"))
            .and_then(id_text)
            .ok_or_else(|| Error::SqlResponse(format!("{} statement returned no id", what)))
    }
}

#[async_trait]
impl MaterialStore for RemoteStore {
    async fn upsert_subject(&self, name: &str, description: &str) -> Result<String> {
        let sql = self.statements.upsert_subject(name, description);
        self.returning_id(&sql, "subject upsert").await
    }

    async fn find_material(&self, source_uri: &str) -> Result<Option<String>> {
        let sql = self.statements.find_material(source_uri);
        let rows = self.client.execute(&sql).await?;
        Ok(rows.first().and_then(|row| row.get("id")).and_then(id_text))
    }

    async fn insert_material(&self, material: &NewMaterial<'_>) -> Result<String> {
        let sql = self.statements.insert_material(material);
        self.returning_id(&sql, "material insert").await
    }

    async fn existing_pages(&self, material_id: &str) -> Result<Vec<ExistingPage>> {
        let sql = self.statements.existing_pages(material_id);
        let rows = self.client.execute(&sql).await?;
        let pages = rows.iter().map(parse_existing_page).collect::<Result<Vec<_>>>()?;
        debug!("Material {} has {} stored pages", material_id, pages.len());
        Ok(pages)
    }

    async fn upsert_page(&self, page: &PageRecord<'_>) -> Result<String> {
        let sql = self.statements.upsert_page(page);
        self.returning_id(&sql, "page upsert").await
    }

    async fn delete_chunks(&self, page_id: &str) -> Result<()> {
        let sql = self.statements.delete_chunks(page_id);
        self.client.execute(&sql).await?;
        Ok(())
    }

    async fn insert_chunk(&self, chunk: &ChunkRecord<'_>) -> Result<()> {
        let sql = self.statements.insert_chunk(chunk);
        self.client.execute(&sql).await?;
        Ok(())
    }
}

/// Ids are opaque: uuids arrive as strings, serial keys as numbers
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Counts may come back as JSON numbers or, for bigint, as strings
fn as_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_existing_page(row: &Value) -> Result<ExistingPage> {
    let page_no = as_u64(row.get("page_no"))
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| Error::SqlResponse(format!("page row without page_no: {}", row)))?;

    let image_uri = row
        .get("image_uri")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(ExistingPage {
        page_no,
        image_uri,
        chunk_count: as_u64(row.get("chunk_count")).unwrap_or(0),
    })
}
