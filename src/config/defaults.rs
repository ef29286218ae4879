//! Default values for configuration

/// Default remote schema holding the subject/material/page/chunk tables
pub fn default_schema() -> String {
    "adamus".to_string()
}

/// Default base URL of the management API; the project ref is appended
pub fn default_sql_api_base() -> String {
    "https://api.supabase.com/v1/projects".to_string()
}

/// Default OCR endpoint (Google Vision `images:annotate`)
pub fn default_ocr_url() -> String {
    "https://vision.googleapis.com/v1/images:annotate".to_string()
}

/// Default maximum characters per chunk
pub fn default_chunk_max_chars() -> usize {
    1200
}

/// Default overlap characters between hard-split windows
pub fn default_chunk_overlap() -> usize {
    200
}

/// Default number of retries after the first SQL attempt
pub fn default_sql_retries() -> usize {
    5
}

/// Default linear backoff step between SQL retries (milliseconds)
pub fn default_sql_backoff_ms() -> u64 {
    1500
}

/// Default SQL request timeout in seconds
pub fn default_sql_timeout() -> u64 {
    60
}

/// Default OCR request timeout in seconds
pub fn default_ocr_timeout() -> u64 {
    120
}

/// Pause after each OCR call (milliseconds)
pub fn default_pause_after_extract_ms() -> u64 {
    300
}

/// Pause after deleting a page's chunks (milliseconds)
pub fn default_pause_after_delete_ms() -> u64 {
    200
}

/// Pause after each chunk insert (milliseconds)
pub fn default_pause_after_insert_ms() -> u64 {
    100
}

/// Secrets file key for the SQL endpoint bearer token
pub const ACCESS_TOKEN_KEY: &str = "SUPABASE_ACCESS_TOKEN";

/// Secrets file key for the project reference
pub const PROJECT_REF_KEY: &str = "SUPABASE_PROJECT_REF";

/// Secrets file key for the OCR API key
pub const OCR_API_KEY: &str = "GOOGLE_API_KEY";
