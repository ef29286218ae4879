//! SQL text for the material tables
//!
//! Tables (assumed to exist in the configured schema):
//! - `subjects (id, name unique, description)`
//! - `materials (id, subject_id, chapter, paragraph, title, source_type, source_uri unique, metadata jsonb)`
//! - `material_pages (id, material_id, page_no, image_uri, ocr_text, ocr_confidence)`, unique `(material_id, page_no)`
//! - `material_chunks (id, material_id, page_id, chunk_index, content)`

use super::{ChunkRecord, NewMaterial, PageRecord};
use crate::sql::{dollar_quote, optional_literal, quote_literal};

/// Statement builder bound to one schema
#[derive(Debug, Clone)]
pub struct Statements {
    schema: String,
}

impl Statements {
    /// `schema` must already be a validated identifier
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    pub fn upsert_subject(&self, name: &str, description: &str) -> String {
        format!(
            "insert into {s}.subjects (name, description) values ({name}, {description}) \
             on conflict (name) do update set description = excluded.description \
             returning id;",
            s = self.schema,
            name = quote_literal(name),
            description = quote_literal(description),
        )
    }

    pub fn find_material(&self, source_uri: &str) -> String {
        format!(
            "select id from {s}.materials where source_uri = {uri} limit 1;",
            s = self.schema,
            uri = quote_literal(source_uri),
        )
    }

    pub fn insert_material(&self, material: &NewMaterial<'_>) -> String {
        format!(
            "insert into {s}.materials \
             (subject_id, chapter, paragraph, title, source_type, source_uri, metadata) \
             values ({subject}, {chapter}, {paragraph}, {title}, {kind}, {uri}, {metadata}::jsonb) \
             returning id;",
            s = self.schema,
            subject = quote_literal(material.subject_id),
            chapter = optional_literal(material.chapter),
            paragraph = optional_literal(material.paragraph),
            title = quote_literal(material.title),
            kind = quote_literal(&material.source_type.to_string()),
            uri = quote_literal(material.source_uri),
            metadata = quote_literal(&material.metadata.to_string()),
        )
    }

    pub fn existing_pages(&self, material_id: &str) -> String {
        format!(
            "select p.page_no, p.image_uri, \
             (select count(*) from {s}.material_chunks c where c.page_id = p.id) as chunk_count \
             from {s}.material_pages p where p.material_id = {material} order by p.page_no;",
            s = self.schema,
            material = quote_literal(material_id),
        )
    }

    pub fn upsert_page(&self, page: &PageRecord<'_>) -> String {
        format!(
            "insert into {s}.material_pages \
             (material_id, page_no, image_uri, ocr_text, ocr_confidence) \
             values ({material}, {page_no}, {uri}, {text}, null) \
             on conflict (material_id, page_no) do update set \
             image_uri = excluded.image_uri, \
             ocr_text = excluded.ocr_text, \
             ocr_confidence = excluded.ocr_confidence \
             returning id;",
            s = self.schema,
            material = quote_literal(page.material_id),
            page_no = page.page_no,
            uri = quote_literal(page.image_uri),
            text = dollar_quote(page.text),
        )
    }

    pub fn delete_chunks(&self, page_id: &str) -> String {
        format!(
            "delete from {s}.material_chunks where page_id = {page};",
            s = self.schema,
            page = quote_literal(page_id),
        )
    }

    pub fn insert_chunk(&self, chunk: &ChunkRecord<'_>) -> String {
        format!(
            "insert into {s}.material_chunks (material_id, page_id, chunk_index, content) \
             values ({material}, {page}, {index}, {content});",
            s = self.schema,
            material = quote_literal(chunk.material_id),
            page = quote_literal(chunk.page_id),
            index = chunk.chunk_index,
            content = dollar_quote(chunk.content),
        )
    }
}
