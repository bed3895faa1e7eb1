//! Hybrid query engine: metadata matching blended with embedding similarity.
//!
//! # Scoring
//!
//! For each record (all comparisons case-insensitive):
//!
//! | Signal | Points |
//! |--------|--------|
//! | author equals query | 100 |
//! | author contains query (otherwise) | 50 |
//! | title equals query | 90 |
//! | title contains query (otherwise) | 40 |
//! | tags contain query | 30 |
//! | preview contains query | 20 |
//!
//! Any exact match doubles the metadata score. Similarity is cosine × 100,
//! clamped to `[0, 100]`.
//!
//! ```text
//! final = metadata + similarity × 0.5   if metadata > 0
//! final = similarity                    otherwise
//! ```
//!
//! A named author or title anchors the ranking and similarity only nudges
//! the order; free-text queries rank by similarity alone. Records with
//! `final == 0` and no metadata match are dropped. Ties on `final` are broken
//! by ascending content address, and at most [`MAX_RESULTS`] are returned.

use anyhow::Result;
use std::cmp::Ordering;

use crate::config::Config;
use crate::embedding::{cosine_similarity, create_embedder, Embedder};
use crate::error::SearchError;
use crate::extract::metadata::{AUTHOR, SOURCE_URL, TAGS, TITLE};
use crate::models::{ContentAddress, IndexRecord, QueryResult};
use crate::store::{load_all, FsRecordStore, RecordStore};

pub const AUTHOR_EXACT: f64 = 100.0;
pub const AUTHOR_PARTIAL: f64 = 50.0;
pub const TITLE_EXACT: f64 = 90.0;
pub const TITLE_PARTIAL: f64 = 40.0;
pub const TAG_MATCH: f64 = 30.0;
pub const PREVIEW_MATCH: f64 = 20.0;
pub const EXACT_MATCH_MULTIPLIER: f64 = 2.0;
pub const SIMILARITY_WEIGHT: f64 = 0.5;
pub const MAX_RESULTS: usize = 5;

/// Scores for one record against one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub similarity: f64,
    pub metadata: f64,
    pub final_score: f64,
}

impl Score {
    pub fn is_relevant(&self) -> bool {
        self.final_score > 0.0 || self.metadata > 0.0
    }
}

/// Cosine similarity as a percentage in `[0, 100]`. Records without an
/// embedding score 0.
pub fn similarity_percent(query: &[f32], record: &IndexRecord) -> f64 {
    match &record.embedding {
        Some(vector) => (f64::from(cosine_similarity(query, vector)) * 100.0).clamp(0.0, 100.0),
        None => 0.0,
    }
}

/// Metadata points for `query` (already lowercased and trimmed).
pub fn metadata_score(query: &str, record: &IndexRecord) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let field = |key: &str| {
        record
            .metadata
            .get(key)
            .map(|v| v.trim().to_lowercase())
            .unwrap_or_default()
    };
    let (author, title, tags) = (field(AUTHOR), field(TITLE), field(TAGS));
    let preview = record.text_preview.to_lowercase();

    let mut score = 0.0;
    let mut exact = false;

    if author == query {
        score += AUTHOR_EXACT;
        exact = true;
    } else if author.contains(query) {
        score += AUTHOR_PARTIAL;
    }

    if title == query {
        score += TITLE_EXACT;
        exact = true;
    } else if title.contains(query) {
        score += TITLE_PARTIAL;
    }

    if tags.contains(query) {
        score += TAG_MATCH;
    }
    if preview.contains(query) {
        score += PREVIEW_MATCH;
    }

    if exact {
        score *= EXACT_MATCH_MULTIPLIER;
    }
    score
}

pub fn score_record(query: &str, query_vector: &[f32], record: &IndexRecord) -> Score {
    let similarity = similarity_percent(query_vector, record);
    let metadata = metadata_score(&query.trim().to_lowercase(), record);
    let final_score = if metadata > 0.0 {
        metadata + similarity * SIMILARITY_WEIGHT
    } else {
        similarity
    };
    Score {
        similarity,
        metadata,
        final_score,
    }
}

/// Rank `(address, record)` pairs for an already-embedded query.
pub fn rank(
    query: &str,
    query_vector: &[f32],
    records: &[(ContentAddress, IndexRecord)],
) -> Vec<QueryResult> {
    let mut scored: Vec<(&ContentAddress, &IndexRecord, Score)> = records
        .iter()
        .map(|(address, record)| (address, record, score_record(query, query_vector, record)))
        .filter(|(_, _, score)| score.is_relevant())
        .collect();

    scored.sort_by(|a, b| {
        b.2.final_score
            .partial_cmp(&a.2.final_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    scored.truncate(MAX_RESULTS);

    scored
        .into_iter()
        .map(|(address, record, score)| {
            let field = |key: &str| record.metadata.get(key).cloned().unwrap_or_default();
            QueryResult {
                hash: address.to_string(),
                title: field(TITLE),
                author: field(AUTHOR),
                preview: record.text_preview.clone(),
                source: field(SOURCE_URL),
                tags: field(TAGS),
                similarity: score.similarity,
                metadata_score: score.metadata,
                final_score: score.final_score,
            }
        })
        .collect()
}

/// Embed the query and rank every readable record.
///
/// A query cannot run without the embedding service; the failure carries
/// the reason and a remediation. Corrupt records are skipped.
pub async fn search(
    store: &dyn RecordStore,
    embedder: &dyn Embedder,
    query: &str,
) -> Result<Vec<QueryResult>, SearchError> {
    let query_embedding = embedder.embed(query.trim()).await?;
    let (records, _corrupt) = load_all(store)?;
    Ok(rank(query, &query_embedding.vector, &records))
}

pub async fn run_search(config: &Config, query: &str, json: bool) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = FsRecordStore::new(&config.index.dir);
    let embedder = create_embedder(&config.embedding);
    let results = match search(&store, embedder.as_ref(), query).await {
        Ok(results) => results,
        Err(e) => anyhow::bail!("query {:?} failed: {}\n  hint: {}", query, e, e.remediation()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            result.final_score,
            result.title,
            result.author
        );
        println!(
            "    similarity: {:.1}%  metadata: {:.0}",
            result.similarity, result.metadata_score
        );
        if !result.tags.is_empty() {
            println!("    tags: {}", result.tags);
        }
        if !result.source.is_empty() {
            println!("    source: {}", result.source);
        }
        println!("    preview: \"{}\"", result.preview);
        println!("    hash: {}", result.hash);
        println!();
    }
    Ok(())
}
