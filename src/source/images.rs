//! Folders of page scans

use super::{PageSource, SourcePage, TextRecognizer};
use crate::config::file_uri;
use crate::error::{Error, Result};
use crate::store::SourceType;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;
use walkdir::WalkDir;

/// Extensions accepted as page images (compared lowercase)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Marker the capture app appends to a second shot of the same page
const DUPLICATE_MARKER: &str = " 1";

fn duplicate_suffix_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s+1$").expect("valid duplicate suffix regex"))
}

fn camera_number_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"IMG_(\d+)").expect("valid camera number regex"))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Key shared by `name.jpg` and its duplicate `name 1.jpg`
fn duplicate_key(path: &Path) -> String {
    let stem = stem(path);
    let base = duplicate_suffix_regex().replace(&stem, "");
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    format!("{}.{}", base, ext)
}

/// Camera-numbered files first by number, everything else by name
fn page_order_key(path: &Path) -> (u8, u64, String) {
    let number = camera_number_regex()
        .captures(&stem(path))
        .and_then(|caps| caps[1].parse::<u64>().ok());

    match number {
        Some(n) => (0, n, file_name(path)),
        None => (1, 0, file_name(path)),
    }
}

/// List the page images of a folder in page order
///
/// Only direct children with an image extension are considered. When the
/// capture app produced both `name.jpg` and `name 1.jpg`, the one without the
/// ` 1` marker is kept. That marker is a naming habit of the capture
/// workflow, not something the files themselves guarantee.
pub fn select_images(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(Error::InvalidPath(format!(
            "Not a directory: {}",
            folder.display()
        )));
    }

    let mut chosen: HashMap<String, PathBuf> = HashMap::new();

    let walker = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !is_image(path) {
            continue;
        }

        let key = duplicate_key(path);
        let is_duplicate = stem(path).contains(DUPLICATE_MARKER);
        match chosen.get(&key) {
            None => {
                chosen.insert(key, path.to_path_buf());
            }
            Some(current) => {
                if !is_duplicate && stem(current).contains(DUPLICATE_MARKER) {
                    debug!("Preferring {} over {}", path.display(), current.display());
                    chosen.insert(key, path.to_path_buf());
                } else {
                    debug!("Skipping duplicate capture {}", path.display());
                }
            }
        }
    }

    let mut images: Vec<PathBuf> = chosen.into_values().collect();
    images.sort_by_cached_key(|p| page_order_key(p));
    Ok(images)
}

/// Page images read through a [`TextRecognizer`]
pub struct ImageFolder<R> {
    pages: Vec<SourcePage>,
    paths: Vec<PathBuf>,
    recognizer: R,
}

impl<R: TextRecognizer> ImageFolder<R> {
    /// Number the images 1..N in the given order
    pub fn new(images: Vec<PathBuf>, recognizer: R) -> Result<Self> {
        let mut pages = Vec::with_capacity(images.len());
        let mut paths = Vec::with_capacity(images.len());

        for (idx, image) in images.into_iter().enumerate() {
            let canonical = image
                .canonicalize()
                .map_err(|e| Error::InvalidPath(format!("{}: {}", image.display(), e)))?;
            let page_no = u32::try_from(idx + 1)
                .map_err(|_| Error::Other("too many images in one folder".to_string()))?;
            pages.push(SourcePage {
                page_no,
                image_uri: file_uri(&canonical),
                label: file_name(&canonical),
            });
            paths.push(canonical);
        }

        Ok(Self {
            pages,
            paths,
            recognizer,
        })
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }
}

#[async_trait]
impl<R: TextRecognizer> PageSource for ImageFolder<R> {
    fn source_type(&self) -> SourceType {
        SourceType::Image
    }

    fn pages(&self) -> &[SourcePage] {
        &self.pages
    }

    fn metadata(&self) -> Value {
        json!({ "count": self.pages.len() })
    }

    fn match_by_uri(&self) -> bool {
        true
    }

    fn calls_remote(&self) -> bool {
        true
    }

    async fn extract(&self, page: &SourcePage) -> Result<String> {
        let path = (page.page_no as usize)
            .checked_sub(1)
            .and_then(|idx| self.paths.get(idx))
            .ok_or_else(|| Error::Other(format!("No image for page {}", page.page_no)))?;
        self.recognizer.recognize(path).await
    }
}
