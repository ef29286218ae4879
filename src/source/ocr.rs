//! Text recognition for page images

use crate::config::OcrConfig;
use crate::error::{Error, Result};
use crate::parse::{sanitize_bytes, sanitize_text};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};
use url::Url;

/// Maximum characters of an error body kept in [`Error::Ocr`]
const ERROR_BODY_LIMIT: usize = 300;

/// Anything that can read the text of an image file
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognized text, sanitized and trimmed; empty when the image has none
    async fn recognize(&self, image: &Path) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct AnnotateRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    full_text_annotation: Option<TextAnnotation>,
    #[serde(default)]
    error: Option<ResponseStatus>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ResponseStatus {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Client for the Vision `images:annotate` endpoint
pub struct VisionClient {
    client: Client,
    url: Url,
    api_key: String,
}

impl VisionClient {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn request_url(&self) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("key", &self.api_key);
        url
    }
}

#[async_trait]
impl TextRecognizer for VisionClient {
    async fn recognize(&self, image: &Path) -> Result<String> {
        let bytes = tokio::fs::read(image).await.map_err(|e| {
            Error::Ocr(format!("Failed to read image '{}': {}", image.display(), e))
        })?;

        let body = AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: STANDARD.encode(&bytes),
                },
                features: vec![Feature {
                    kind: "TEXT_DETECTION",
                }],
            }],
        };

        // The API key travels in the query string, keep it out of error messages
        let response = self
            .client
            .post(self.request_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Ocr(format!(
                "OCR request for '{}' returned {}: {}",
                image.display(),
                status,
                text.chars().take(ERROR_BODY_LIMIT).collect::<String>()
            )));
        }

        // Invalid UTF-8 in the body is dropped instead of failing the page
        let raw = response
            .bytes()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;
        let parsed: AnnotateResponse = serde_json::from_str(&sanitize_bytes(&raw))?;

        Ok(annotation_text(parsed, image))
    }
}

fn annotation_text(response: AnnotateResponse, image: &Path) -> String {
    let Some(first) = response.responses.into_iter().next() else {
        debug!("No OCR response entries for {}", image.display());
        return String::new();
    };

    if let Some(status) = first.error {
        warn!(
            "OCR failed for {} (code {}): {}",
            image.display(),
            status.code,
            status.message
        );
        return String::new();
    }

    match first.full_text_annotation {
        Some(annotation) => sanitize_text(Some(&annotation.text)).trim().to_string(),
        None => {
            debug!("No text detected in {}", image.display());
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> VisionClient {
        VisionClient::new(&OcrConfig {
            url: Url::parse(&format!("{}/v1/images:annotate", server.uri())).unwrap(),
            api_key: "vision-key".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn image_file(dir: &TempDir, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join("IMG_0001.jpg");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn test_recognize_sends_base64_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images:annotate"))
            .and(query_param("key", "vision-key"))
            .and(body_json(json!({
                "requests": [{
                    "image": {"content": "aGVsbG8="},
                    "features": [{"type": "TEXT_DETECTION"}]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responses": [{"fullTextAnnotation": {"text": "  Het skelet\r\nbestaat uit botten\u{0007}\n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let image = image_file(&dir, b"hello");
        let text = client_for(&server).recognize(&image).await.unwrap();
        assert_eq!(text, "Het skelet\nbestaat uit botten");
    }

    #[tokio::test]
    async fn test_recognize_drops_invalid_utf8_in_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                b"{\"responses\":[{\"fullTextAnnotation\":{\"text\":\"Het skelet \xff botten\"}}]}".to_vec(),
                "application/json",
            ))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let image = image_file(&dir, b"scan");
        let text = client_for(&server).recognize(&image).await.unwrap();
        assert_eq!(text, "Het skelet  botten");
    }

    #[tokio::test]
    async fn test_recognize_without_annotation_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"responses": [{}]})))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let image = image_file(&dir, b"blank");
        assert_eq!(client_for(&server).recognize(&image).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_recognize_per_image_error_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responses": [{"error": {"code": 3, "message": "Bad image data."}}]
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let image = image_file(&dir, b"garbage");
        assert_eq!(client_for(&server).recognize(&image).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_recognize_http_failure_is_fatal_and_hides_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let image = image_file(&dir, b"x");
        let err = client_for(&server).recognize(&image).await.unwrap_err();
        assert!(matches!(err, Error::Ocr(_)));
        let message = err.to_string();
        assert!(message.contains("403"));
        assert!(!message.contains("vision-key"));
    }

    #[tokio::test]
    async fn test_recognize_missing_file() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .recognize(Path::new("/nonexistent/IMG_0001.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ocr(_)));
    }
}
