//! Blocking client for OpenAI-compatible `/embeddings` endpoints (Upstage by default).

use std::fmt;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use crate::embed::EmbeddingProvider;
use crate::error::{DocvecError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.upstage.ai/v1";
pub const DEFAULT_PASSAGE_MODEL: &str = "embedding-passage";
pub const DEFAULT_QUERY_MODEL: &str = "embedding-query";

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: usize = 3;
const MAX_RETRY_AFTER_SECS: u64 = 60;

pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_BASE_URL: &str = "DOCVEC_EMBED_BASE_URL";
pub const ENV_PASSAGE_MODEL: &str = "DOCVEC_PASSAGE_MODEL";
pub const ENV_QUERY_MODEL: &str = "DOCVEC_QUERY_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "DOCVEC_EMBED_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "DOCVEC_EMBED_MAX_RETRIES";

#[derive(Clone)]
pub struct ApiEmbedConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model used for batch passage embeddings.
    pub passage_model: String,
    /// Model used for the single-item fallback.
    pub query_model: String,
    pub timeout: Duration,
    /// Attempts per request, including the first one.
    pub max_retries: usize,
}

impl fmt::Debug for ApiEmbedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiEmbedConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("passage_model", &self.passage_model)
            .field("query_model", &self.query_model)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ApiEmbedConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            passage_model: DEFAULT_PASSAGE_MODEL.to_string(),
            query_model: DEFAULT_QUERY_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Reads `API_KEY` (required) and the optional `DOCVEC_EMBED_*` overrides.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(ENV_API_KEY)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| DocvecError::embedding(format!("{ENV_API_KEY} is not set")))?;
        let mut config = Self::new(api_key);
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Some(model) = lookup(ENV_PASSAGE_MODEL) {
            config.passage_model = model;
        }
        if let Some(model) = lookup(ENV_QUERY_MODEL) {
            config.query_model = model;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                DocvecError::embedding(format!("{ENV_TIMEOUT_SECS} must be whole seconds, got `{raw}`"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = raw.trim().parse::<usize>().map_err(|_| {
                DocvecError::embedding(format!("{ENV_MAX_RETRIES} must be a count, got `{raw}`"))
            })?;
        }
        Ok(config)
    }
}

pub struct ApiEmbedder {
    client: Client,
    endpoint: String,
    config: ApiEmbedConfig,
}

impl ApiEmbedder {
    pub fn new(config: ApiEmbedConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(DocvecError::embedding("missing API key"));
        }
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim()))
            .map_err(|_| DocvecError::embedding("API key is not a valid header value"))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;
        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ApiEmbedConfig {
        &self.config
    }

    fn request(&self, model: &str, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let body = EmbeddingRequest {
                model,
                input: inputs,
            };
            match self.client.post(&self.endpoint).json(&body).send() {
                Ok(resp) if resp.status().is_success() => return parse_response(resp, inputs.len()),
                Ok(resp) => {
                    let status = resp.status();
                    let wait = retry_after(resp.headers()).unwrap_or_else(|| backoff(attempt));
                    let text = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt < attempts {
                        tracing::warn!(
                            %status,
                            attempt,
                            wait_ms = wait.as_millis() as u64,
                            "embedding request rejected; retrying"
                        );
                        thread::sleep(wait);
                        continue;
                    }
                    return Err(DocvecError::embedding(format!(
                        "{model} request failed ({status}): {text}"
                    )));
                }
                Err(err) => {
                    if is_retryable(&err) && attempt < attempts {
                        tracing::warn!(attempt, error = %err, "embedding request error; retrying");
                        thread::sleep(backoff(attempt));
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

impl EmbeddingProvider for ApiEmbedder {
    fn name(&self) -> &str {
        &self.config.passage_model
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.request(&self.config.passage_model, texts)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&self.config.query_model, &[text])?;
        vectors.pop().ok_or(DocvecError::EmbeddingCountMismatch {
            inputs: 1,
            outputs: 0,
        })
    }
}

fn parse_response(resp: Response, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut parsed: EmbeddingResponse = resp.json()?;
    parsed.data.sort_by_key(|entry| entry.index);
    if parsed.data.len() != expected {
        return Err(DocvecError::EmbeddingCountMismatch {
            inputs: expected,
            outputs: parsed.data.len(),
        });
    }
    Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

fn backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1u64 << capped))
}

/// Numeric `Retry-After` header, capped at a minute.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
