//! Embedding client abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]**: fails with `no_credential`; used when no API key is configured.
//! - **[`RemoteEmbedder`]**: calls the inference service's `/embeddings` endpoint.
//!
//! Also provides the vector and text utilities shared by indexing and search:
//! - [`cosine_similarity`]: compare two embedding vectors
//! - [`clean_text`]: collapse whitespace and cap length before embedding
//! - [`embed_batch_isolated`]: one batch, retried item by item when the request is rejected
//!
//! # Failure Policy
//!
//! The client never retries a failed request. Callers decide: the index
//! builder falls back to a basic record, the query engine aborts. The one
//! exception is a batch the service rejects as a request, which
//! [`embed_batch_isolated`] re-sends one text at a time.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::error::InferenceError;
use crate::inference::InferenceClient;

/// A vector plus the id of the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model hint sent with every request (e.g. `"auto"`).
    fn model_hint(&self) -> &str;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Embedding, InferenceError>;

    /// Embed several texts in one round-trip. Output order matches input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, InferenceError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

// ============ Disabled Embedder ============

/// Used when no credential is configured. Every call fails with
/// [`InferenceError::NoCredential`].
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_hint(&self) -> &str {
        "none"
    }

    async fn embed(&self, _text: &str) -> Result<Embedding, InferenceError> {
        Err(InferenceError::NoCredential)
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Embedding>, InferenceError> {
        Err(InferenceError::NoCredential)
    }
}

// ============ Remote Embedder ============

#[derive(Debug, Deserialize)]
struct EmbeddingPayload {
    embedding: Vec<f32>,
    model_used: String,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct BatchPayload {
    embeddings: Vec<EmbeddingPayload>,
}

impl EmbeddingPayload {
    fn into_embedding(self) -> Result<Embedding, InferenceError> {
        if self.embedding.is_empty() {
            return Err(InferenceError::InvalidResponse("empty embedding".into()));
        }
        if self.dimensions != self.embedding.len() {
            return Err(InferenceError::InvalidResponse(format!(
                "dimensions is {} but embedding has {} values",
                self.dimensions,
                self.embedding.len()
            )));
        }
        Ok(Embedding {
            vector: self.embedding,
            model: self.model_used,
        })
    }
}

/// Embedder backed by `POST {endpoint}/embeddings`.
pub struct RemoteEmbedder {
    client: InferenceClient,
    model: String,
}

impl RemoteEmbedder {
    pub fn new(client: InferenceClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_hint(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Embedding, InferenceError> {
        let body = serde_json::json!({ "text": text, "model": self.model });
        let json = self.client.post_json("embeddings", &body).await?;
        let payload: EmbeddingPayload = serde_json::from_value(json)
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
        payload.into_embedding()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, InferenceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({ "texts": texts, "model": self.model });
        let json = self.client.post_json("embeddings", &body).await?;
        let payload: BatchPayload = serde_json::from_value(json)
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
        if payload.embeddings.len() != texts.len() {
            return Err(InferenceError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                payload.embeddings.len()
            )));
        }
        payload
            .embeddings
            .into_iter()
            .map(EmbeddingPayload::into_embedding)
            .collect()
    }
}

/// Create the embedder for this configuration.
///
/// Without a credential this is a [`DisabledEmbedder`], so the absence is
/// reported as `no_credential` at the first call rather than at startup.
pub fn create_embedder(config: &EmbeddingConfig) -> Box<dyn Embedder> {
    match InferenceClient::from_config(config) {
        Ok(client) => {
            let embedder = RemoteEmbedder::new(client, config.model.clone());
            debug!(
                endpoint = embedder.client.endpoint(),
                model = embedder.model_hint(),
                "embedding enabled"
            );
            Box::new(embedder)
        }
        Err(e) => {
            debug!(reason = e.reason(), "embedding disabled");
            Box::new(DisabledEmbedder)
        }
    }
}

/// Embed one batch, one result per text.
///
/// When the service rejects the request itself (`bad_request`,
/// `invalid_response`) the texts are retried one at a time, so a single bad
/// text does not degrade its neighbours. Any other failure applies to the
/// whole batch.
pub async fn embed_batch_isolated(
    embedder: &dyn Embedder,
    batch: &[String],
) -> Vec<Result<Embedding, InferenceError>> {
    let err = match embedder.embed_batch(batch).await {
        Ok(vectors) => return vectors.into_iter().map(Ok).collect(),
        Err(e) => e,
    };
    let retry_singly = batch.len() > 1
        && matches!(
            err,
            InferenceError::BadRequest(_) | InferenceError::InvalidResponse(_)
        );
    if !retry_singly {
        info!(size = batch.len(), reason = err.reason(), "embedding batch failed");
        return std::iter::repeat(Err(err)).take(batch.len()).collect();
    }

    info!(size = batch.len(), reason = err.reason(), "batch rejected; embedding items one by one");
    let mut results = Vec::with_capacity(batch.len());
    for text in batch {
        results.push(embedder.embed(text).await);
    }
    results
}

/// Collapse all whitespace runs to single spaces and cap at `max_chars`.
pub fn clean_text(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_chars * 4));
    for (count, word) in text.split_whitespace().enumerate() {
        if count > 0 {
            out.push(' ');
        }
        out.push_str(word);
        if out.chars().count() >= max_chars {
            break;
        }
    }
    truncate_chars(&out, max_chars)
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or a zero-norm vector.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
