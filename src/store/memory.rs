//! In-memory [`MaterialStore`] used by driver tests

use super::{ChunkRecord, ExistingPage, MaterialStore, NewMaterial, PageRecord};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct StoredPage {
    pub id: String,
    pub material_id: String,
    pub page_no: u32,
    pub image_uri: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub page_id: String,
    pub chunk_index: u32,
    pub content: String,
}

#[derive(Default)]
struct State {
    subjects: BTreeMap<String, (String, String)>,
    materials: HashMap<String, String>,
    pages: Vec<StoredPage>,
    chunks: Vec<StoredChunk>,
    next_id: u64,
    chunk_inserts: usize,
    /// Chunk contents the store refuses to insert
    rejected: Vec<String>,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert of exactly this content fail
    pub fn reject_content(&self, content: &str) {
        self.state.lock().unwrap().rejected.push(content.to_string());
    }

    pub fn pages(&self) -> Vec<StoredPage> {
        self.state.lock().unwrap().pages.clone()
    }

    pub fn chunks_for_page(&self, page_no: u32) -> Vec<StoredChunk> {
        let state = self.state.lock().unwrap();
        let Some(page) = state.pages.iter().find(|p| p.page_no == page_no) else {
            return Vec::new();
        };
        state
            .chunks
            .iter()
            .filter(|c| c.page_id == page.id)
            .cloned()
            .collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.state.lock().unwrap().chunks.len()
    }

    /// Number of successful chunk inserts since creation
    pub fn chunk_inserts(&self) -> usize {
        self.state.lock().unwrap().chunk_inserts
    }

    pub fn subject_description(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .subjects
            .get(name)
            .map(|(_, description)| description.clone())
    }

    pub fn material_count(&self) -> usize {
        self.state.lock().unwrap().materials.len()
    }
}

#[async_trait]
impl MaterialStore for MemoryStore {
    async fn upsert_subject(&self, name: &str, description: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if let Some((id, stored)) = state.subjects.get_mut(name) {
            *stored = description.to_string();
            return Ok(id.clone());
        }
        let id = state.id("subject");
        state
            .subjects
            .insert(name.to_string(), (id.clone(), description.to_string()));
        Ok(id)
    }

    async fn find_material(&self, source_uri: &str) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().materials.get(source_uri).cloned())
    }

    async fn insert_material(&self, material: &NewMaterial<'_>) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.materials.contains_key(material.source_uri) {
            return Err(Error::Sql {
                status: 409,
                body: "duplicate key value violates unique constraint".to_string(),
            });
        }
        let id = state.id("material");
        state
            .materials
            .insert(material.source_uri.to_string(), id.clone());
        Ok(id)
    }

    async fn existing_pages(&self, material_id: &str) -> Result<Vec<ExistingPage>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pages
            .iter()
            .filter(|p| p.material_id == material_id)
            .map(|p| ExistingPage {
                page_no: p.page_no,
                image_uri: Some(p.image_uri.clone()),
                chunk_count: state.chunks.iter().filter(|c| c.page_id == p.id).count() as u64,
            })
            .collect())
    }

    async fn upsert_page(&self, page: &PageRecord<'_>) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .pages
            .iter_mut()
            .find(|p| p.material_id == page.material_id && p.page_no == page.page_no)
        {
            existing.image_uri = page.image_uri.to_string();
            existing.text = page.text.to_string();
            return Ok(existing.id.clone());
        }
        let id = state.id("page");
        state.pages.push(StoredPage {
            id: id.clone(),
            material_id: page.material_id.to_string(),
            page_no: page.page_no,
            image_uri: page.image_uri.to_string(),
            text: page.text.to_string(),
        });
        Ok(id)
    }

    async fn delete_chunks(&self, page_id: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .chunks
            .retain(|c| c.page_id != page_id);
        Ok(())
    }

    async fn insert_chunk(&self, chunk: &ChunkRecord<'_>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.rejected.iter().any(|r| r == chunk.content) {
            return Err(Error::Sql {
                status: 400,
                body: "invalid byte sequence".to_string(),
            });
        }
        if state
            .chunks
            .iter()
            .any(|c| c.page_id == chunk.page_id && c.chunk_index == chunk.chunk_index)
        {
            return Err(Error::Sql {
                status: 409,
                body: "duplicate chunk index".to_string(),
            });
        }
        state.chunks.push(StoredChunk {
            page_id: chunk.page_id.to_string(),
            chunk_index: chunk.chunk_index,
            content: chunk.content.to_string(),
        });
        state.chunk_inserts += 1;
        Ok(())
    }
}
