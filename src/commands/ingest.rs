//! Ingest command implementation
//!
//! Reconciles one page source against what the store already holds:
//! pages that already have chunks are skipped unless forced, every other page
//! is extracted, upserted and gets its chunks replaced.

use crate::chunk::chunk_text;
use crate::config::{ChunkConfig, MaterialConfig, Pacing, Settings};
use crate::error::{Error, Result};
use crate::parse::{ascii_fallback, preview};
use crate::progress::{advance, finish, page_progress};
use crate::source::{PageSource, SourcePage};
use crate::store::{ChunkRecord, ExistingPage, MaterialStore, NewMaterial, PageRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Characters of a rejected chunk shown in the log
const PREVIEW_CHARS: usize = 200;

/// Statistics from an ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestStats {
    pub material_id: String,
    pub pages_total: usize,
    pub pages_processed: usize,
    pub pages_skipped: usize,
    pub chunks_inserted: usize,
    /// Chunks stored only after stripping non-ASCII characters
    pub chunks_recovered: usize,
    pub chunks_failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Options for one ingest run
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub material: MaterialConfig,
    pub chunk: ChunkConfig,
    pub force_pages: BTreeSet<u32>,
    pub pacing: Pacing,
    pub show_progress: bool,
}

impl From<&Settings> for IngestOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            material: settings.material.clone(),
            chunk: settings.chunk,
            force_pages: settings.force_pages.clone(),
            pacing: settings.pacing,
            show_progress: true,
        }
    }
}

/// Stored pages of a material, looked up by page number or image URI
struct StoredPages {
    by_page: HashMap<u32, ExistingPage>,
    by_uri: HashMap<String, ExistingPage>,
}

impl StoredPages {
    fn new(pages: Vec<ExistingPage>) -> Self {
        let mut by_page = HashMap::new();
        let mut by_uri = HashMap::new();
        for page in pages {
            if let Some(uri) = &page.image_uri {
                by_uri.insert(uri.clone(), page.clone());
            }
            by_page.insert(page.page_no, page);
        }
        Self { by_page, by_uri }
    }

    /// The page-number match wins; the URI is only consulted without one
    fn lookup(&self, page: &SourcePage, match_by_uri: bool) -> Option<&ExistingPage> {
        self.by_page.get(&page.page_no).or_else(|| {
            if match_by_uri {
                self.by_uri.get(&page.image_uri)
            } else {
                None
            }
        })
    }
}

enum ChunkOutcome {
    Inserted,
    Recovered,
    Failed,
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Ingest every page of `source` into `store`
pub async fn cmd_ingest(
    store: &dyn MaterialStore,
    source: &dyn PageSource,
    options: &IngestOptions,
) -> Result<IngestStats> {
    let started_at = Utc::now();
    let material = &options.material;

    let subject_id = store
        .upsert_subject(&material.subject, &material.subject_description)
        .await?;
    debug!("Subject '{}' has id {}", material.subject, subject_id);

    let material_id = resolve_material(store, source, material, &subject_id).await?;
    let stored = StoredPages::new(store.existing_pages(&material_id).await?);

    let pages = source.pages();
    let total = pages.len();
    let mut stats = IngestStats {
        material_id: material_id.clone(),
        pages_total: total,
        pages_processed: 0,
        pages_skipped: 0,
        chunks_inserted: 0,
        chunks_recovered: 0,
        chunks_failed: 0,
        started_at,
        finished_at: started_at,
    };

    let pb = if options.show_progress {
        page_progress(total, &material.title)
    } else {
        None
    };

    for page in pages {
        advance(pb.as_ref(), &page.label);

        let done = stored
            .lookup(page, source.match_by_uri())
            .map(|existing| existing.chunk_count > 0)
            .unwrap_or(false);
        if done && !options.force_pages.contains(&page.page_no) {
            info!("Skipping existing page {}: {}", page.page_no, page.label);
            stats.pages_skipped += 1;
            continue;
        }

        info!("Page {}/{}: {}", page.page_no, total, page.label);

        let text = source.extract(page).await?;
        if source.calls_remote() {
            pause(options.pacing.after_extract).await;
        }
        if text.is_empty() {
            warn!("No text found on page {}: {}", page.page_no, page.label);
        }

        let page_id = store
            .upsert_page(&PageRecord {
                material_id: &material_id,
                page_no: page.page_no,
                image_uri: &page.image_uri,
                text: &text,
            })
            .await?;

        store.delete_chunks(&page_id).await?;
        pause(options.pacing.after_delete).await;

        let chunks = chunk_text(&text, &options.chunk);
        debug!("Page {} split into {} chunks", page.page_no, chunks.len());

        for (idx, content) in chunks.iter().enumerate() {
            let chunk_index = u32::try_from(idx + 1)
                .map_err(|_| Error::Other(format!("too many chunks on page {}", page.page_no)))?;
            let record = ChunkRecord {
                material_id: &material_id,
                page_id: &page_id,
                chunk_index,
                content,
            };

            match insert_chunk(store, &record, page.page_no, &options.pacing).await {
                ChunkOutcome::Inserted => stats.chunks_inserted += 1,
                ChunkOutcome::Recovered => {
                    stats.chunks_inserted += 1;
                    stats.chunks_recovered += 1;
                }
                ChunkOutcome::Failed => stats.chunks_failed += 1,
            }
        }

        stats.pages_processed += 1;
    }

    finish(pb, "done");
    stats.finished_at = Utc::now();

    Ok(stats)
}

/// Find the material by source URI or create it
async fn resolve_material(
    store: &dyn MaterialStore,
    source: &dyn PageSource,
    material: &MaterialConfig,
    subject_id: &str,
) -> Result<String> {
    if let Some(id) = store.find_material(&material.source_uri).await? {
        info!("Using existing material {} ({})", id, material.source_uri);
        return Ok(id);
    }

    let id = store
        .insert_material(&NewMaterial {
            subject_id,
            chapter: material.chapter.as_deref(),
            paragraph: material.paragraph.as_deref(),
            title: &material.title,
            source_type: source.source_type(),
            source_uri: &material.source_uri,
            metadata: source.metadata(),
        })
        .await?;
    info!("Created material {} ({})", id, material.source_uri);
    Ok(id)
}

/// Insert one chunk, retrying once with its ASCII-only form if rejected
async fn insert_chunk(
    store: &dyn MaterialStore,
    record: &ChunkRecord<'_>,
    page_no: u32,
    pacing: &Pacing,
) -> ChunkOutcome {
    let err = match store.insert_chunk(record).await {
        Ok(()) => {
            pause(pacing.after_insert).await;
            return ChunkOutcome::Inserted;
        }
        Err(e) => e,
    };

    error!(
        "Chunk insert failed page {} chunk {}: {}",
        page_no, record.chunk_index, err
    );
    warn!("Chunk preview: {:?}", preview(record.content, PREVIEW_CHARS));

    let fallback = ascii_fallback(record.content);
    if fallback.is_empty() || fallback == record.content {
        warn!(
            "No ASCII fallback for page {} chunk {}",
            page_no, record.chunk_index
        );
        return ChunkOutcome::Failed;
    }

    let retry = ChunkRecord {
        content: &fallback,
        ..*record
    };
    match store.insert_chunk(&retry).await {
        Ok(()) => {
            pause(pacing.after_insert).await;
            info!(
                "Fallback insert ok page {} chunk {}",
                page_no, record.chunk_index
            );
            ChunkOutcome::Recovered
        }
        Err(e) => {
            error!(
                "Fallback insert failed page {} chunk {}: {}",
                page_no, record.chunk_index, e
            );
            ChunkOutcome::Failed
        }
    }
}

/// Print ingestion statistics
pub fn print_ingest_stats(stats: &IngestStats) {
    println!("\n✓ Ingestion complete\n");
    println!("Material: {}", stats.material_id);
    println!(
        "Pages: {} total, {} processed, {} skipped",
        stats.pages_total, stats.pages_processed, stats.pages_skipped
    );
    println!("Chunks inserted: {}", stats.chunks_inserted);
    if stats.chunks_recovered > 0 {
        println!("Chunks stored as ASCII fallback: {}", stats.chunks_recovered);
    }
    if stats.chunks_failed > 0 {
        println!("Chunks failed: {}", stats.chunks_failed);
    }
    let elapsed = stats.finished_at - stats.started_at;
    println!("Duration: {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ParagraphMode;
    use crate::config::SqlConfig;
    use crate::source::{ImageFolder, PdfDocument, TextRecognizer};
    use crate::store::memory::MemoryStore;
    use crate::store::SourceType;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use url::Url;

    const SOURCE_URI: &str = "local://vakken/biologie-h4";

    /// Returns "<edition> <file name>" unless a page has a scripted text
    struct ScriptedRecognizer {
        edition: String,
        scripted: Mutex<HashMap<String, String>>,
        calls: AtomicUsize,
    }

    impl ScriptedRecognizer {
        fn new(edition: &str) -> Self {
            Self {
                edition: edition.to_string(),
                scripted: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn with_text(self, file: &str, text: &str) -> Self {
            self.scripted
                .lock()
                .unwrap()
                .insert(file.to_string(), text.to_string());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextRecognizer for ScriptedRecognizer {
        async fn recognize(&self, image: &Path) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = image.file_name().unwrap().to_string_lossy().to_string();
            let scripted = self.scripted.lock().unwrap().get(&name).cloned();
            Ok(scripted.unwrap_or_else(|| format!("{} {}", self.edition, name)))
        }
    }

    fn scans(count: usize) -> (TempDir, Vec<PathBuf>) {
        let dir = TempDir::new().unwrap();
        let paths = (1..=count)
            .map(|n| {
                let path = dir.path().join(format!("IMG_{:04}.jpg", n));
                std::fs::write(&path, b"scan").unwrap();
                path
            })
            .collect();
        (dir, paths)
    }

    fn options(source_type: SourceType, force: &[u32]) -> IngestOptions {
        IngestOptions {
            material: MaterialConfig {
                subject: "Biologie".to_string(),
                subject_description: "Hoofdstuk 4: Stevigheid en beweging".to_string(),
                chapter: Some("4".to_string()),
                paragraph: None,
                title: "Biologie hoofdstuk 4".to_string(),
                source_uri: SOURCE_URI.to_string(),
                source_type,
            },
            chunk: ChunkConfig {
                max_chars: 40,
                overlap_chars: 5,
                paragraphs: source_type.paragraph_mode(),
            },
            force_pages: force.iter().copied().collect(),
            pacing: Pacing::none(),
            show_progress: false,
        }
    }

    async fn ingest_images(
        store: &MemoryStore,
        images: &[PathBuf],
        recognizer: ScriptedRecognizer,
        force: &[u32],
    ) -> (IngestStats, usize) {
        let folder = ImageFolder::new(images.to_vec(), recognizer).unwrap();
        let stats = cmd_ingest(store, &folder, &options(SourceType::Image, force))
            .await
            .unwrap();
        (stats, folder.recognizer().calls())
    }

    #[tokio::test]
    async fn test_second_run_skips_every_page() {
        let store = MemoryStore::new();
        let (_dir, images) = scans(5);

        let (first, calls) = ingest_images(&store, &images, ScriptedRecognizer::new("eerste"), &[]).await;
        assert_eq!(calls, 5);
        assert_eq!(first.pages_processed, 5);
        assert_eq!(first.chunks_inserted, 5);
        assert_eq!(store.chunk_count(), 5);

        let (second, calls) = ingest_images(&store, &images, ScriptedRecognizer::new("tweede"), &[]).await;
        assert_eq!(calls, 0);
        assert_eq!(second.pages_skipped, 5);
        assert_eq!(second.pages_processed, 0);
        assert_eq!(second.chunks_inserted, 0);
        assert_eq!(store.chunk_inserts(), 5);
        assert_eq!(store.material_count(), 1);
        assert_eq!(second.material_id, first.material_id);
    }

    #[tokio::test]
    async fn test_forced_page_replaces_chunks() {
        let store = MemoryStore::new();
        let (_dir, images) = scans(3);

        let long_page = "Alinea een is best lang hier\n\nAlinea twee is ook lang hier\n\nAlinea drie sluit af hier";
        let recognizer = ScriptedRecognizer::new("eerste").with_text("IMG_0002.jpg", long_page);
        ingest_images(&store, &images, recognizer, &[]).await;
        assert_eq!(store.chunks_for_page(2).len(), 3);

        let (stats, calls) = ingest_images(&store, &images, ScriptedRecognizer::new("herzien"), &[2]).await;
        assert_eq!(calls, 1);
        assert_eq!(stats.pages_processed, 1);
        assert_eq!(stats.pages_skipped, 2);

        let chunks = store.chunks_for_page(2);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 1);
        assert_eq!(chunks[0].content, "herzien IMG_0002.jpg");

        let page = store.pages().into_iter().find(|p| p.page_no == 2).unwrap();
        assert_eq!(page.text, "herzien IMG_0002.jpg");
        assert_eq!(store.chunks_for_page(1)[0].content, "eerste IMG_0001.jpg");
    }

    #[tokio::test]
    async fn test_chunk_indexes_are_sequential() {
        let store = MemoryStore::new();
        let (_dir, images) = scans(1);

        let text = "Eerste alinea met tekst\n\nTweede alinea met tekst\n\nDerde alinea met tekst";
        let recognizer = ScriptedRecognizer::new("x").with_text("IMG_0001.jpg", text);
        ingest_images(&store, &images, recognizer, &[]).await;

        let indexes: Vec<u32> = store.chunks_for_page(1).iter().map(|c| c.chunk_index).collect();
        assert_eq!(indexes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_rejected_chunk_recovered_as_ascii() {
        let store = MemoryStore::new();
        store.reject_content("Één zin over spieren");
        let (_dir, images) = scans(2);

        let recognizer = ScriptedRecognizer::new("eerste").with_text("IMG_0001.jpg", "Één zin over spieren");
        let (stats, _) = ingest_images(&store, &images, recognizer, &[]).await;

        assert_eq!(stats.chunks_recovered, 1);
        assert_eq!(stats.chunks_failed, 0);
        assert_eq!(stats.chunks_inserted, 2);
        assert_eq!(store.chunks_for_page(1)[0].content, "n zin over spieren");
    }

    #[tokio::test]
    async fn test_unrecoverable_chunk_does_not_stop_the_run() {
        let store = MemoryStore::new();
        store.reject_content("Plain text only");
        let (_dir, images) = scans(2);

        let recognizer = ScriptedRecognizer::new("eerste").with_text("IMG_0001.jpg", "Plain text only");
        let (stats, _) = ingest_images(&store, &images, recognizer, &[]).await;

        assert_eq!(stats.chunks_failed, 1);
        assert_eq!(stats.chunks_recovered, 0);
        assert_eq!(stats.pages_processed, 2);
        assert!(store.chunks_for_page(1).is_empty());
        assert_eq!(store.chunks_for_page(2).len(), 1);
    }

    #[tokio::test]
    async fn test_blank_page_is_stored_without_chunks() {
        let store = MemoryStore::new();
        let (_dir, images) = scans(2);

        let recognizer = ScriptedRecognizer::new("eerste").with_text("IMG_0002.jpg", "");
        let (stats, _) = ingest_images(&store, &images, recognizer, &[]).await;
        assert_eq!(stats.pages_processed, 2);
        assert_eq!(store.pages().len(), 2);
        assert!(store.chunks_for_page(2).is_empty());

        // A page without chunks is not done yet
        let (again, calls) = ingest_images(&store, &images, ScriptedRecognizer::new("tweede"), &[]).await;
        assert_eq!(calls, 1);
        assert_eq!(again.pages_processed, 1);
        assert_eq!(store.chunks_for_page(2)[0].content, "tweede IMG_0002.jpg");
    }

    #[tokio::test]
    async fn test_image_matched_by_uri() {
        let store = MemoryStore::new();
        let (_dir, images) = scans(1);
        let folder = ImageFolder::new(images, ScriptedRecognizer::new("x")).unwrap();
        let uri = folder.pages()[0].image_uri.clone();

        // Stored under another page number from an earlier ordering
        let subject = store.upsert_subject("Biologie", "").await.unwrap();
        let material = store
            .insert_material(&NewMaterial {
                subject_id: &subject,
                chapter: None,
                paragraph: None,
                title: "t",
                source_type: SourceType::Image,
                source_uri: SOURCE_URI,
                metadata: json!({"count": 1}),
            })
            .await
            .unwrap();
        let page_id = store
            .upsert_page(&PageRecord {
                material_id: &material,
                page_no: 7,
                image_uri: &uri,
                text: "oud",
            })
            .await
            .unwrap();
        store
            .insert_chunk(&ChunkRecord {
                material_id: &material,
                page_id: &page_id,
                chunk_index: 1,
                content: "oud",
            })
            .await
            .unwrap();

        let stats = cmd_ingest(&store, &folder, &options(SourceType::Image, &[]))
            .await
            .unwrap();
        assert_eq!(stats.pages_skipped, 1);
        assert_eq!(folder.recognizer().calls(), 0);
    }

    #[tokio::test]
    async fn test_pdf_pages_match_by_number_only() {
        let store = MemoryStore::new();

        let first = PdfDocument::from_texts(vec!["1492 Columbus".to_string()], SOURCE_URI).unwrap();
        cmd_ingest(&store, &first, &options(SourceType::Pdf, &[]))
            .await
            .unwrap();

        // Every PDF page shares the source URI, so page 2 must not match page 1
        let second = PdfDocument::from_texts(
            vec!["1492 Columbus".to_string(), "1517 Luther\n1648 Vrede van Munster".to_string()],
            SOURCE_URI,
        )
        .unwrap();
        let stats = cmd_ingest(&store, &second, &options(SourceType::Pdf, &[]))
            .await
            .unwrap();

        assert_eq!(stats.pages_skipped, 1);
        assert_eq!(stats.pages_processed, 1);
        let chunks: Vec<String> = store.chunks_for_page(2).into_iter().map(|c| c.content).collect();
        assert_eq!(chunks, vec!["1517 Luther\n1648 Vrede van Munster"]);
    }

    #[tokio::test]
    async fn test_subject_description_is_updated() {
        let store = MemoryStore::new();
        store.upsert_subject("Biologie", "oud").await.unwrap();
        let (_dir, images) = scans(1);

        ingest_images(&store, &images, ScriptedRecognizer::new("x"), &[]).await;
        assert_eq!(
            store.subject_description("Biologie").as_deref(),
            Some("Hoofdstuk 4: Stevigheid en beweging")
        );
    }

    #[test]
    fn test_options_from_settings() {
        let opts = options(SourceType::Pdf, &[3]);
        let settings = Settings {
            material: opts.material.clone(),
            chunk: opts.chunk,
            force_pages: opts.force_pages.clone(),
            sql: SqlConfig::new(Url::parse("http://127.0.0.1:1/query").unwrap(), "t", "adamus"),
            pacing: Pacing::default(),
        };

        let from = IngestOptions::from(&settings);
        assert!(from.show_progress);
        assert_eq!(from.chunk.paragraphs, ParagraphMode::Lines);
        assert_eq!(from.pacing.after_extract, Duration::from_millis(300));
        assert!(from.force_pages.contains(&3));
    }
}
