//! Custom error types for adamus-ingest

use thiserror::Error;

/// Main error type for ingestion operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Env file error: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("No input files: {0}")]
    NoInput(String),

    #[error("SQL endpoint returned {status}: {body}")]
    Sql { status: u16, body: String },

    #[error("Unexpected SQL response: {0}")]
    SqlResponse(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("PDF extraction error: {0}")]
    Pdf(String),

    #[error("PDF has no extractable text: {0}")]
    EmptyPdf(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for adamus-ingest
pub type Result<T> = std::result::Result<T, Error>;
