//! Error taxonomy for the indexing and retrieval pipeline.
//!
//! | Type | Policy |
//! |------|--------|
//! | [`ExtractError`] | Recovered by the next extractor in the chain; never fatal. |
//! | [`InferenceError`] | Index time: degrade to a basic record. Query time: abort. |
//! | [`RecordError`] | A corrupt record is reported and left untouched. |
//! | [`SearchError`] | Fatal for the query that raised it. |

use thiserror::Error;

use crate::models::ContentAddress;

/// A text or metadata extractor failed or is unavailable.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{tool} is not installed")]
    ToolMissing { tool: String },

    #[error("{tool} failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),

    #[error("remote extraction failed: {0}")]
    Remote(#[from] InferenceError),

    #[error("no text produced")]
    Empty,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure talking to the inference service (embeddings, OCR, vision).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("no credential configured for the inference service")]
    NoCredential,

    #[error("inference request timed out")]
    Timeout,

    #[error("credential rejected by the inference service (401)")]
    Unauthorized,

    #[error("credential is not allowed to use this service (403)")]
    Forbidden,

    #[error("rate limited by the inference service (429)")]
    RateLimited,

    #[error("request rejected by the inference service (400): {0}")]
    BadRequest(String),

    #[error("inference service error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("could not reach the inference service: {0}")]
    Connection(String),

    #[error("invalid response from the inference service: {0}")]
    InvalidResponse(String),
}

impl InferenceError {
    /// Stable machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoCredential => "no_credential",
            Self::Timeout => "timeout",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::RateLimited => "rate_limited",
            Self::BadRequest(_) => "bad_request",
            Self::Server { .. } => "server_error",
            Self::Connection(_) => "connection",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }

    /// One concrete step the user can take.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::NoCredential => {
                "set IPFS_SEARCH_API_KEY or place a key file in ~/.ipfs/api_keys, then run `ipfs-search build`"
            }
            Self::Timeout => "retry later or raise embedding.timeout_secs in the config",
            Self::Unauthorized => "replace the API key; the current one was rejected",
            Self::Forbidden => "enable the embeddings service for this API key",
            Self::RateLimited => {
                "wait a minute and retry, or raise embedding.batch_delay_ms in the config"
            }
            Self::BadRequest(_) => "check embedding.model and the size of the indexed text",
            Self::Server { .. } => "retry later; the inference service reported an internal error",
            Self::Connection(_) => "check embedding.endpoint and network connectivity",
            Self::InvalidResponse(_) => "check that embedding.endpoint points at a compatible service",
        }
    }
}

/// Failure reading or writing an index record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record for {address} is corrupt: {reason}")]
    Corrupt {
        address: ContentAddress,
        reason: String,
    },

    #[error("refusing to write record for {address}: {reason}")]
    Invalid {
        address: ContentAddress,
        reason: String,
    },

    #[error("refusing to merge records: {0}")]
    Merge(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl RecordError {
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::Corrupt { .. } => {
                "remove it with `ipfs-search remove <address>` and run `ipfs-search build`"
            }
            Self::Invalid { .. } | Self::Merge(_) => "re-run indexing for this item",
            Self::Io(_) | Self::Serialize(_) => "check permissions on the index directory",
        }
    }
}

/// Failure of a hybrid query.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("semantic search is unavailable: {0}")]
    Embedding(#[from] InferenceError),

    #[error(transparent)]
    Store(#[from] RecordError),
}

impl SearchError {
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::Embedding(e) => e.remediation(),
            Self::Store(e) => e.remediation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_distinct() {
        let all = [
            InferenceError::NoCredential,
            InferenceError::Timeout,
            InferenceError::Unauthorized,
            InferenceError::Forbidden,
            InferenceError::RateLimited,
            InferenceError::BadRequest(String::new()),
            InferenceError::Server {
                status: 500,
                body: String::new(),
            },
            InferenceError::Connection(String::new()),
            InferenceError::InvalidResponse(String::new()),
        ];
        let mut reasons: Vec<&str> = all.iter().map(|e| e.reason()).collect();
        reasons.sort_unstable();
        reasons.dedup();
        assert_eq!(reasons.len(), all.len());
    }

    #[test]
    fn no_credential_hint_mentions_key_location() {
        assert!(InferenceError::NoCredential
            .remediation()
            .contains("IPFS_SEARCH_API_KEY"));
    }
}
