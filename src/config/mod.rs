//! Configuration management for adamus-ingest
//!
//! Every knob is a CLI flag that can also come from an `ADAMUS_*`
//! environment variable. Secrets live in a separate dotenv-style file whose
//! path is itself configuration. [`IngestArgs::resolve`] turns the raw
//! arguments into a validated [`Settings`] value that is passed explicitly to
//! the SQL client, the OCR client and the ingest driver.

mod defaults;

pub use defaults::*;

use crate::chunk::ParagraphMode;
use crate::error::{Error, Result};
use crate::store::SourceType;
use clap::Args;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Options shared by every ingest subcommand
#[derive(Debug, Clone, Args)]
pub struct IngestArgs {
    /// Path to the secrets file (SUPABASE_ACCESS_TOKEN, GOOGLE_API_KEY)
    #[arg(long, env = "ADAMUS_ENV_PATH")]
    pub env_file: PathBuf,

    /// Subject name (upserted by name)
    #[arg(long, env = "ADAMUS_SUBJECT")]
    pub subject: String,

    /// Subject description (replaces the stored one)
    #[arg(long, env = "ADAMUS_SUBJECT_DESCRIPTION", default_value = "")]
    pub subject_description: String,

    /// Chapter label of the material
    #[arg(long, env = "ADAMUS_CHAPTER")]
    pub chapter: Option<String>,

    /// Paragraph label of the material
    #[arg(long, env = "ADAMUS_PARAGRAPH")]
    pub paragraph: Option<String>,

    /// Material title (defaults to the input file or folder name)
    #[arg(long, env = "ADAMUS_TITLE")]
    pub title: Option<String>,

    /// Stable material identifier (defaults to file://<canonical input path>)
    #[arg(long, env = "ADAMUS_SOURCE_URI")]
    pub source_uri: Option<String>,

    /// Maximum characters per chunk
    #[arg(long, env = "ADAMUS_CHUNK_MAX", default_value_t = default_chunk_max_chars())]
    pub chunk_max: usize,

    /// Overlap between hard-split windows of an oversized paragraph
    #[arg(long, env = "ADAMUS_CHUNK_OVERLAP", default_value_t = default_chunk_overlap())]
    pub chunk_overlap: usize,

    /// Comma-separated page numbers to reprocess even if already chunked
    #[arg(long, env = "ADAMUS_FORCE_PAGES", default_value = "")]
    pub force_pages: String,

    /// Remote schema holding the material tables
    #[arg(long, env = "ADAMUS_SCHEMA", default_value_t = default_schema())]
    pub schema: String,

    /// Project reference used to build the SQL endpoint URL
    #[arg(long, env = "ADAMUS_PROJECT_REF")]
    pub project_ref: Option<String>,

    /// Full SQL endpoint URL (overrides --project-ref)
    #[arg(long, env = "ADAMUS_SQL_URL")]
    pub sql_url: Option<String>,
}

/// Chunking configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk
    pub max_chars: usize,

    /// Overlap characters between hard-split windows
    pub overlap_chars: usize,

    /// Paragraph splitting rule
    pub paragraphs: ParagraphMode,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_max_chars(),
            overlap_chars: default_chunk_overlap(),
            paragraphs: ParagraphMode::default(),
        }
    }
}

impl ChunkConfig {
    /// Validate chunk limits
    pub fn validate(&self) -> Result<()> {
        if self.max_chars == 0 {
            return Err(Error::Config("chunk max must be at least 1".to_string()));
        }

        if self.overlap_chars >= self.max_chars {
            warn!(
                "Chunk overlap {} >= chunk max {}; oversized paragraphs will be split without overlap",
                self.overlap_chars, self.max_chars
            );
        }

        Ok(())
    }
}

/// Descriptive metadata of the subject and material being ingested
#[derive(Debug, Clone, Serialize)]
pub struct MaterialConfig {
    pub subject: String,
    pub subject_description: String,
    pub chapter: Option<String>,
    pub paragraph: Option<String>,
    pub title: String,
    pub source_uri: String,
    pub source_type: SourceType,
}

/// SQL endpoint connection settings
#[derive(Debug, Clone)]
pub struct SqlConfig {
    pub url: Url,
    pub access_token: String,
    pub schema: String,
    pub retries: usize,
    pub backoff: Duration,
    pub timeout: Duration,
}

impl SqlConfig {
    pub fn new(url: Url, access_token: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            url,
            access_token: access_token.into(),
            schema: schema.into(),
            retries: default_sql_retries(),
            backoff: Duration::from_millis(default_sql_backoff_ms()),
            timeout: Duration::from_secs(default_sql_timeout()),
        }
    }
}

/// OCR endpoint settings
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub url: Url,
    pub api_key: String,
    pub timeout: Duration,
}

impl OcrConfig {
    /// Resolve the OCR endpoint and API key
    pub fn resolve(url: Option<&str>, secrets: &Secrets) -> Result<Self> {
        let url = match url {
            Some(u) => Url::parse(u)?,
            None => Url::parse(&default_ocr_url())?,
        };

        Ok(Self {
            url,
            api_key: secrets.require(OCR_API_KEY)?,
            timeout: Duration::from_secs(default_ocr_timeout()),
        })
    }
}

/// Courtesy pauses between remote calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub after_extract: Duration,
    pub after_delete: Duration,
    pub after_insert: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            after_extract: Duration::from_millis(default_pause_after_extract_ms()),
            after_delete: Duration::from_millis(default_pause_after_delete_ms()),
            after_insert: Duration::from_millis(default_pause_after_insert_ms()),
        }
    }
}

impl Pacing {
    /// No pauses at all
    pub fn none() -> Self {
        Self {
            after_extract: Duration::ZERO,
            after_delete: Duration::ZERO,
            after_insert: Duration::ZERO,
        }
    }
}

/// Fully resolved configuration for one ingest run
#[derive(Debug, Clone)]
pub struct Settings {
    pub material: MaterialConfig,
    pub chunk: ChunkConfig,
    pub force_pages: BTreeSet<u32>,
    pub sql: SqlConfig,
    pub pacing: Pacing,
}

/// Key/value pairs from the secrets file
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: HashMap<String, String>,
}

impl Secrets {
    /// Load a dotenv-style secrets file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "Env file not found: {}",
                path.display()
            )));
        }

        let mut values = HashMap::new();
        for item in dotenvy::from_path_iter(path)? {
            let (key, value) = item?;
            values.insert(key, value);
        }
        debug!("Loaded {} keys from {}", values.len(), path.display());

        Ok(Self { values })
    }

    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Look up a non-empty value
    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Look up a value that must be present
    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| Error::Config(format!("{} missing from env file", key)))
    }
}

/// Blank chapter/paragraph labels are stored as null, same as an unset env var
fn optional_label(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl IngestArgs {
    /// Validate arguments and resolve defaults that depend on the input path
    pub fn resolve(&self, input: &Path, source_type: SourceType) -> Result<(Settings, Secrets)> {
        let secrets = Secrets::load(&self.env_file)?;
        let settings = self.resolve_with(input, source_type, &secrets)?;
        Ok((settings, secrets))
    }

    /// Same as [`IngestArgs::resolve`] with secrets already loaded
    pub fn resolve_with(
        &self,
        input: &Path,
        source_type: SourceType,
        secrets: &Secrets,
    ) -> Result<Settings> {
        let canonical = input
            .canonicalize()
            .map_err(|e| Error::InvalidPath(format!("{}: {}", input.display(), e)))?;

        let subject = self.subject.trim();
        if subject.is_empty() {
            return Err(Error::Config("subject name must not be empty".to_string()));
        }

        validate_schema(&self.schema)?;

        let title = match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => default_title(&canonical, source_type),
        };

        let source_uri = match self.source_uri.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => file_uri(&canonical),
        };

        let chunk = ChunkConfig {
            max_chars: self.chunk_max,
            overlap_chars: self.chunk_overlap,
            paragraphs: source_type.paragraph_mode(),
        };
        chunk.validate()?;

        let access_token = secrets.require(ACCESS_TOKEN_KEY)?;
        let url = self.sql_endpoint(secrets)?;

        Ok(Settings {
            material: MaterialConfig {
                subject: subject.to_string(),
                subject_description: self.subject_description.clone(),
                chapter: optional_label(self.chapter.as_deref()),
                paragraph: optional_label(self.paragraph.as_deref()),
                title,
                source_uri,
                source_type,
            },
            chunk,
            force_pages: parse_force_pages(&self.force_pages),
            sql: SqlConfig::new(url, access_token, self.schema.clone()),
            pacing: Pacing::default(),
        })
    }

    fn sql_endpoint(&self, secrets: &Secrets) -> Result<Url> {
        if let Some(url) = self.sql_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(Url::parse(url.trim())?);
        }

        let project_ref = self
            .project_ref
            .clone()
            .filter(|r| !r.trim().is_empty())
            .or_else(|| secrets.get(PROJECT_REF_KEY))
            .ok_or_else(|| {
                Error::Config(
                    "Set ADAMUS_SQL_URL or ADAMUS_PROJECT_REF (or SUPABASE_PROJECT_REF in the env file)"
                        .to_string(),
                )
            })?;

        sql_endpoint_for_project(project_ref.trim())
    }
}

/// Build the database query endpoint for a project reference
pub fn sql_endpoint_for_project(project_ref: &str) -> Result<Url> {
    if project_ref.is_empty() || !project_ref.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::Config(format!("Invalid project ref: '{}'", project_ref)));
    }

    Ok(Url::parse(&format!(
        "{}/{}/database/query",
        default_sql_api_base(),
        project_ref
    ))?)
}

/// Parse a comma-separated page list, ignoring anything that is not a number
pub fn parse_force_pages(raw: &str) -> BTreeSet<u32> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|p| p.parse().ok())
        .collect()
}

/// `file://` URI for an absolute path
pub fn file_uri(path: &Path) -> String {
    let display = path.display().to_string().replace('\\', "/");
    if display.starts_with('/') {
        format!("file://{}", display)
    } else {
        format!("file:///{}", display)
    }
}

fn default_title(path: &Path, source_type: SourceType) -> String {
    let name = match source_type {
        SourceType::Pdf => path.file_stem(),
        SourceType::Image => path.file_name(),
    };
    name.map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Schema names are interpolated into statements, so only plain identifiers
/// are accepted
fn validate_schema(schema: &str) -> Result<()> {
    let mut chars = schema.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("Invalid schema name: '{}'", schema)))
    }
}
