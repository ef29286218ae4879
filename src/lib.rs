//! adamus-ingest - idempotent ingestion of study material into a remote SQL store
//!
//! This crate provides:
//! - Text sanitizing and paragraph-aware chunking
//! - Page sources for scanned images (remote OCR) and PDFs (local extraction)
//! - A retrying client for a remote SQL execution endpoint
//! - The reconciliation driver that skips already-chunked pages on reruns

pub mod chunk;
pub mod commands;
pub mod config;
pub mod error;
pub mod parse;
pub mod progress;
pub mod source;
pub mod sql;
pub mod store;

pub use config::Settings;
pub use error::{Error, Result};
