//! Core data models used throughout ipfs-search.
//!
//! These types represent the content addresses, index records, query results
//! and build summaries that flow through the indexing and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Model id recorded on basic records.
pub const NO_MODEL: &str = "none";

/// Flat `metadata_*` fields of a record, keyed by their full field name.
pub type Metadata = BTreeMap<String, String>;

/// Opaque, content-derived identifier supplied by the content store.
///
/// The address doubles as the record file name, so construction rejects
/// anything that is not a safe single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn parse(raw: &str) -> Result<Self, InvalidAddress> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(InvalidAddress(raw.to_string()));
        }
        let bad_char = |c: char| c.is_whitespace() || c == '/' || c == '\\' || c == ':';
        if raw.starts_with('.') || raw.chars().any(bad_char) {
            return Err(InvalidAddress(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `n` characters, used for display placeholders.
    pub fn short(&self, n: usize) -> &str {
        match self.0.char_indices().nth(n) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentAddress {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentAddress {
    type Error = InvalidAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentAddress> for String {
    fn from(value: ContentAddress) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content address: {0:?}")]
pub struct InvalidAddress(pub String);

/// One index record per content address.
///
/// A record with an embedding is *full*; without one it is *basic* and
/// carries a `note` (and usually an `error`) explaining why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub text_preview: String,
    pub embedding: Option<Vec<f32>>,
    pub model_used: String,
    pub dimensions: usize,
    #[serde(flatten)]
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndexRecord {
    pub fn full(
        text_preview: String,
        embedding: Vec<f32>,
        model_used: String,
        metadata: Metadata,
    ) -> Self {
        Self {
            text_preview,
            dimensions: embedding.len(),
            embedding: Some(embedding),
            model_used,
            metadata,
            timestamp: Utc::now(),
            note: None,
            error: None,
        }
    }

    pub fn basic(
        text_preview: String,
        metadata: Metadata,
        note: String,
        error: Option<String>,
    ) -> Self {
        Self {
            text_preview,
            embedding: None,
            model_used: NO_MODEL.to_string(),
            dimensions: 0,
            metadata,
            timestamp: Utc::now(),
            note: Some(note),
            error,
        }
    }

    pub fn is_full(&self) -> bool {
        self.embedding.is_some()
    }

    /// Checks the dimension invariant and that every flattened field is a
    /// `metadata_*` key.
    pub fn check(&self) -> Result<(), String> {
        let expected = self.embedding.as_ref().map_or(0, Vec::len);
        if self.dimensions != expected {
            return Err(format!(
                "dimensions is {} but embedding has {} values",
                self.dimensions, expected
            ));
        }
        if let Some(key) = self.metadata.keys().find(|k| !k.starts_with("metadata_")) {
            return Err(format!("unexpected field {:?}", key));
        }
        Ok(())
    }

    /// Looks up a metadata field by short name (`"title"` → `metadata_title`).
    pub fn meta(&self, name: &str) -> Option<&str> {
        self.metadata
            .get(&format!("metadata_{}", name))
            .map(String::as_str)
    }
}

/// A ranked hit produced by the query engine. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub hash: String,
    pub title: String,
    pub author: String,
    pub preview: String,
    pub source: String,
    pub tags: String,
    pub similarity: f64,
    pub metadata_score: f64,
    pub final_score: f64,
}

/// A single item that could not be indexed during a bulk run.
#[derive(Debug, Clone, Serialize)]
pub struct BuildFailure {
    pub address: String,
    pub cause: String,
    pub remediation: String,
}

/// Counts reported at the end of every build run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    pub processed: u64,
    pub indexed: u64,
    pub updated: u64,
    pub skipped: u64,
    pub basic: u64,
    pub failed: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BuildFailure>,
    /// Why items were written as basic records: reason code to remediation.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub basic_hints: BTreeMap<String, String>,
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} indexed={} updated={} skipped={} basic={} failed={}",
            self.processed, self.indexed, self.updated, self.skipped, self.basic, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_rejects_unsafe_names() {
        assert!(ContentAddress::parse("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").is_ok());
        assert!(ContentAddress::parse("").is_err());
        assert!(ContentAddress::parse("../etc").is_err());
        assert!(ContentAddress::parse("a/b").is_err());
        assert!(ContentAddress::parse("has space").is_err());
        assert!(ContentAddress::parse(".hidden").is_err());
    }

    #[test]
    fn short_address_is_char_safe() {
        let addr = ContentAddress::parse("bafybeigdyrzt").unwrap();
        assert_eq!(addr.short(4), "bafy");
        assert_eq!(addr.short(100), "bafybeigdyrzt");
    }

    #[test]
    fn basic_record_serializes_null_embedding() {
        let mut meta = Metadata::new();
        meta.insert("metadata_title".into(), "Notes".into());
        let rec = IndexRecord::basic("hello".into(), meta, "basic only".into(), None);
        let json: serde_json::Value = serde_json::to_value(&rec).unwrap();
        assert!(json["embedding"].is_null());
        assert_eq!(json["model_used"], "none");
        assert_eq!(json["dimensions"], 0);
        assert_eq!(json["metadata_title"], "Notes");
        assert_eq!(json["note"], "basic only");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn full_record_roundtrips_metadata() {
        let mut meta = Metadata::new();
        meta.insert("metadata_author".into(), "Jane Doe".into());
        meta.insert("metadata_custom_project".into(), "apollo: phase 2".into());
        let rec = IndexRecord::full("text".into(), vec![0.5, 0.25], "m".into(), meta);
        assert_eq!(rec.dimensions, 2);
        let raw = serde_json::to_string(&rec).unwrap();
        let back: IndexRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, rec);
        assert_eq!(back.meta("custom_project"), Some("apollo: phase 2"));
        assert!(back.check().is_ok());
    }

    #[test]
    fn check_flags_dimension_mismatch() {
        let mut rec = IndexRecord::full("t".into(), vec![1.0], "m".into(), Metadata::new());
        rec.dimensions = 3;
        assert!(rec.check().is_err());
    }

    #[test]
    fn summary_display_is_key_value() {
        let s = BuildSummary {
            processed: 10,
            indexed: 2,
            updated: 2,
            skipped: 6,
            ..Default::default()
        };
        assert_eq!(
            s.to_string(),
            "processed=10 indexed=2 updated=2 skipped=6 basic=0 failed=0"
        );
    }
}
