//! Client for the remote SQL execution endpoint
//!
//! Statements are POSTed as `{"query": "<sql>"}` with a bearer token and
//! the endpoint answers with a JSON array of row objects. Transient failures
//! are retried with a linearly growing pause.

mod literal;

pub use literal::*;

use crate::config::SqlConfig;
use crate::error::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Maximum characters of an error body kept in [`Error::Sql`]
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

/// Statuses worth another attempt: expired auth, rate limits, server errors
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

pub struct SqlClient {
    client: Client,
    url: Url,
    access_token: String,
    retries: usize,
    backoff: Duration,
}

impl SqlClient {
    pub fn new(config: &SqlConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            access_token: config.access_token.clone(),
            retries: config.retries,
            backoff: config.backoff,
        })
    }

    /// Execute one statement and return its rows
    pub async fn execute(&self, query: &str) -> Result<Vec<Value>> {
        let request = QueryRequest { query };
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.retries {
            let sent = self
                .client
                .post(self.url.clone())
                .bearer_auth(&self.access_token)
                .json(&request)
                .send()
                .await;

            match sent {
                Ok(response) if response.status().is_success() => {
                    let body = response.text().await?;
                    return parse_rows(&body);
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let err = Error::Sql {
                        status: status.as_u16(),
                        body: body.chars().take(ERROR_BODY_LIMIT).collect(),
                    };
                    if !is_retryable_status(status) {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) if e.is_timeout() || e.is_connect() => last_err = Some(Error::Http(e)),
                Err(e) => return Err(Error::Http(e)),
            }

            if attempt < self.retries {
                let wait = self.backoff * (attempt as u32 + 1);
                if let Some(err) = &last_err {
                    warn!(
                        "SQL attempt {}/{} failed, retrying in {:?}: {}",
                        attempt + 1,
                        self.retries + 1,
                        wait,
                        err
                    );
                }
                tokio::time::sleep(wait).await;
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Other("SQL request failed".to_string())))
    }
}

/// Parse the endpoint's response body into rows
fn parse_rows(body: &str) -> Result<Vec<Value>> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(body)? {
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        other => {
            debug!("Unexpected SQL response body: {}", other);
            Err(Error::SqlResponse(format!(
                "expected a JSON array of rows, got {}",
                json_kind(&other)
            )))
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
