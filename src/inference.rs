//! HTTP client for the remote inference service.
//!
//! The service hosts embeddings, OCR, vision and transcription behind one
//! base URL and one API key. Every call is a JSON `POST`; HTTP failures are
//! mapped onto [`InferenceError`] so callers can pick a policy per reason.
//!
//! # Credential Resolution
//!
//! 1. `IPFS_SEARCH_API_KEY` environment variable
//! 2. `embedding.api_key` in the config file
//! 3. the first non-empty file in `embedding.key_dir` (default `~/.ipfs/api_keys`)

use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::InferenceError;

pub const API_KEY_ENV: &str = "IPFS_SEARCH_API_KEY";

/// Find the API key, or `None` when no credential is configured.
pub fn resolve_credential(config: &EmbeddingConfig) -> Option<String> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Some(key.trim().to_string());
        }
    }
    if let Some(key) = config.api_key.as_deref() {
        if !key.trim().is_empty() {
            return Some(key.trim().to_string());
        }
    }
    read_key_dir(&config.key_dir)
}

fn read_key_dir(dir: &Path) -> Option<String> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files.into_iter().find_map(|p| {
        let key = std::fs::read_to_string(&p).ok()?;
        let key = key.trim();
        (!key.is_empty()).then(|| key.to_string())
    })
}

/// Authenticated JSON client for the inference service.
#[derive(Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl InferenceClient {
    pub fn new(endpoint: &str, api_key: String, timeout: Duration) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Connection(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build a client from config, or fail with `NoCredential`.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, InferenceError> {
        let key = resolve_credential(config).ok_or(InferenceError::NoCredential)?;
        Self::new(
            &config.endpoint,
            key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `POST {endpoint}/{path}` with a JSON body, returning the JSON response.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, InferenceError> {
        let url = format!("{}/{}", self.endpoint, path.trim_start_matches('/'));
        debug!(url = %url, "inference request");

        let response = self
            .http
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| InferenceError::InvalidResponse(e.to_string()));
        }

        let body_text = response.text().await.unwrap_or_default();
        Err(map_status(status, body_text))
    }
}

fn map_transport_error(e: reqwest::Error) -> InferenceError {
    if e.is_timeout() {
        InferenceError::Timeout
    } else {
        InferenceError::Connection(e.to_string())
    }
}

pub(crate) fn map_status(status: StatusCode, body: String) -> InferenceError {
    match status {
        StatusCode::BAD_REQUEST => InferenceError::BadRequest(body),
        StatusCode::UNAUTHORIZED => InferenceError::Unauthorized,
        StatusCode::FORBIDDEN => InferenceError::Forbidden,
        StatusCode::TOO_MANY_REQUESTS => InferenceError::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => InferenceError::Timeout,
        other => InferenceError::Server {
            status: other.as_u16(),
            body,
        },
    }
}
