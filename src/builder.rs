//! Index builder: turns pinned objects and local files into index records.
//!
//! # Record States
//!
//! ```text
//! unindexed ──▶ basic ──▶ full
//!     └─────────────────────▲
//! ```
//!
//! * A full record is never re-extracted by a rebuild and never replaced by
//!   a basic one, even when re-indexing is forced.
//! * A basic record is upgraded when the embedding service is reachable.
//! * Corrupt records are counted as failures and left untouched.
//!
//! Items are examined in listing order and collected into batches of at most
//! `batch_size`. A full batch is embedded in one request and its records are
//! written, each as the merge of its embedding half and metadata half, before
//! the fixed delay that precedes the next batch. An interrupted run keeps
//! every batch it has already written.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::content_store::ContentStore;
use crate::embedding::{clean_text, embed_batch_isolated, Embedder, Embedding};
use crate::error::{InferenceError, RecordError};
use crate::extract::metadata::is_sidecar;
use crate::extract::{ExtractSource, Extracted, ExtractionPipeline};
use crate::models::{BuildFailure, BuildSummary, ContentAddress, IndexRecord, Metadata};
use crate::progress::{BuildProgressEvent, BuildProgressReporter, NoProgress};
use crate::store::{merge_partials, RecordStore};

/// Leads the `note` of every basic record.
pub const BASIC_NOTE: &str =
    "Indexed without an embedding; run `ipfs-search build` once the inference service is reachable";

/// The note for a basic record, ending with the fix for `error`.
pub fn basic_note(error: &InferenceError) -> String {
    format!("{}. To fix: {}", BASIC_NOTE, error.remediation())
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub preview_chars: usize,
    pub max_chars: usize,
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl BuildOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            preview_chars: config.index.preview_chars,
            max_chars: config.embedding.max_chars,
            batch_size: config.embedding.batch_size,
            batch_delay: Duration::from_millis(config.embedding.batch_delay_ms),
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

enum Item {
    Pinned(ContentAddress),
    File(PathBuf),
}

impl Item {
    fn label(&self) -> String {
        match self {
            Item::Pinned(address) => address.to_string(),
            Item::File(path) => path.display().to_string(),
        }
    }
}

enum Existing {
    Skip,
    Proceed(Option<IndexRecord>),
    Unreadable(RecordError),
}

struct Pending {
    address: ContentAddress,
    extracted: Extracted,
    previous: Option<IndexRecord>,
}

enum Outcome {
    Indexed,
    Updated,
    Basic {
        reason: &'static str,
        remediation: &'static str,
    },
    Failed(BuildFailure),
}

/// Bookkeeping for one run.
struct RunState {
    summary: BuildSummary,
    seen: HashSet<ContentAddress>,
    batch: Vec<Pending>,
    batches_sent: usize,
    embedded: u64,
    total: u64,
}

impl RunState {
    fn tally(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Indexed => self.summary.indexed += 1,
            Outcome::Updated => self.summary.updated += 1,
            Outcome::Basic {
                reason,
                remediation,
            } => {
                self.summary.basic += 1;
                self.summary
                    .basic_hints
                    .entry(reason.to_string())
                    .or_insert_with(|| remediation.to_string());
            }
            Outcome::Failed(failure) => record_failure(&mut self.summary, failure),
        }
    }
}

pub struct IndexBuilder<'a> {
    content: &'a dyn ContentStore,
    records: &'a dyn RecordStore,
    embedder: &'a dyn Embedder,
    extraction: &'a ExtractionPipeline,
    options: BuildOptions,
    progress: Box<dyn BuildProgressReporter>,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(
        content: &'a dyn ContentStore,
        records: &'a dyn RecordStore,
        embedder: &'a dyn Embedder,
        extraction: &'a ExtractionPipeline,
        options: BuildOptions,
    ) -> Self {
        Self {
            content,
            records,
            embedder,
            extraction,
            options,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn BuildProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Rebuild over every pinned address. Full records are skipped.
    pub async fn build_all(&self) -> Result<BuildSummary> {
        self.progress.report(BuildProgressEvent::Discovering {
            source: self.content.name().to_string(),
        });
        let addresses = self
            .content
            .list_pinned()
            .with_context(|| format!("Failed to list pinned items from {}", self.content.name()))?;
        info!(count = addresses.len(), store = self.content.name(), "rebuilding index");
        let items = addresses.into_iter().map(Item::Pinned).collect();
        Ok(self.run(items, false).await)
    }

    /// Index one object already in the content store.
    pub async fn index_address(&self, address: &ContentAddress, force: bool) -> BuildSummary {
        self.run(vec![Item::Pinned(address.clone())], force).await
    }

    /// Add a file (or every file under a directory) to the content store and
    /// index it in place, so sidecar files and file names apply.
    pub async fn index_path(&self, path: &Path, force: bool) -> Result<BuildSummary> {
        let files = collect_files(path)?;
        info!(count = files.len(), path = %path.display(), "indexing local files");
        Ok(self.run(files.into_iter().map(Item::File).collect(), force).await)
    }

    async fn run(&self, items: Vec<Item>, force: bool) -> BuildSummary {
        let batch_size = self.options.batch_size.max(1);
        let mut state = RunState {
            summary: BuildSummary::default(),
            seen: HashSet::new(),
            batch: Vec::with_capacity(batch_size),
            batches_sent: 0,
            embedded: 0,
            total: items.len() as u64,
        };
        info!(
            items = state.total,
            model = self.embedder.model_hint(),
            batch_size,
            "index run started"
        );

        for (i, item) in items.into_iter().enumerate() {
            state.summary.processed += 1;
            match self.prepare(&item, force, &mut state.seen).await {
                Ok(Some(p)) => state.batch.push(p),
                Ok(None) => state.summary.skipped += 1,
                Err(failure) => record_failure(&mut state.summary, failure),
            }
            self.progress.report(BuildProgressEvent::Extracting {
                n: i as u64 + 1,
                total: state.total,
            });
            if state.batch.len() >= batch_size {
                self.flush(&mut state).await;
            }
        }
        if !state.batch.is_empty() {
            self.flush(&mut state).await;
        }

        info!(summary = %state.summary, "index run finished");
        state.summary
    }

    /// Embed the collected batch and write its records.
    async fn flush(&self, state: &mut RunState) {
        let batch = std::mem::take(&mut state.batch);
        if state.batches_sent > 0 && !self.options.batch_delay.is_zero() {
            tokio::time::sleep(self.options.batch_delay).await;
        }
        state.batches_sent += 1;

        let texts: Vec<String> = batch
            .iter()
            .map(|p| clean_text(&p.extracted.text, self.options.max_chars))
            .collect();
        debug!(batch = state.batches_sent, size = texts.len(), "embedding batch");
        let results = embed_batch_isolated(self.embedder, &texts).await;
        for (item, result) in batch.into_iter().zip(results) {
            let outcome = self.write_item(item, result);
            state.tally(outcome);
        }

        state.embedded += texts.len() as u64;
        self.progress.report(BuildProgressEvent::Embedding {
            n: state.embedded,
            total: state.total,
        });
    }

    /// Resolve the address, consult the existing record and extract.
    /// `Ok(None)` means skipped.
    async fn prepare(
        &self,
        item: &Item,
        force: bool,
        seen: &mut HashSet<ContentAddress>,
    ) -> Result<Option<Pending>, BuildFailure> {
        let fail = |cause: String, remediation: &str| BuildFailure {
            address: item.label(),
            cause,
            remediation: remediation.to_string(),
        };

        let address = match item {
            Item::Pinned(address) => address.clone(),
            Item::File(path) => self.content.add(path).map_err(|e| {
                fail(
                    format!("could not add to {} store: {:#}", self.content.name(), e),
                    "check that the content store is running and the file is readable",
                )
            })?,
        };
        if !seen.insert(address.clone()) {
            debug!(address = %address, "duplicate content in this run");
            return Ok(None);
        }

        let previous = match self.check_existing(&address, force) {
            Existing::Skip => {
                debug!(address = %address, "already fully indexed");
                return Ok(None);
            }
            Existing::Proceed(previous) => previous,
            Existing::Unreadable(e) => {
                warn!(address = %address, "leaving unreadable record untouched: {}", e);
                return Err(BuildFailure {
                    address: address.to_string(),
                    cause: e.to_string(),
                    remediation: e.remediation().to_string(),
                });
            }
        };

        let extracted = match item {
            Item::Pinned(_) => {
                let mut extracted =
                    self.fetch_and_extract(&address).await.map_err(|e| BuildFailure {
                        address: address.to_string(),
                        cause: format!("{:#}", e),
                        remediation: "check that the object is available from the content store"
                            .into(),
                    })?;
                // A fetched object has no file name or sidecar, so metadata
                // captured when it was first indexed from a path wins.
                if let Some(previous) = &previous {
                    extracted.metadata.extend(previous.metadata.clone());
                }
                extracted
            }
            Item::File(path) => {
                let source = ExtractSource::from_path(path, Some(address.clone())).map_err(|e| {
                    fail(format!("could not read file: {}", e), "check file permissions")
                })?;
                self.extraction.extract(&source).await
            }
        };

        Ok(Some(Pending {
            address,
            extracted,
            previous,
        }))
    }

    fn check_existing(&self, address: &ContentAddress, force: bool) -> Existing {
        match self.records.get(address) {
            Ok(Some(record)) if record.is_full() && !force => Existing::Skip,
            Ok(previous) => Existing::Proceed(previous),
            Err(e) => Existing::Unreadable(e),
        }
    }

    async fn fetch_and_extract(&self, address: &ContentAddress) -> Result<Extracted> {
        let bytes = self
            .content
            .get(address)
            .with_context(|| format!("Failed to fetch {}", address))?;
        let mut tmp = tempfile::NamedTempFile::new().context("Failed to create temp file")?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        let source = ExtractSource::from_fetched(tmp.path(), address.clone())?;
        Ok(self.extraction.extract(&source).await)
    }

    fn write_item(&self, item: Pending, result: Result<Embedding, InferenceError>) -> Outcome {
        let preview = clean_text(&item.extracted.text, self.options.preview_chars);
        let had_record = item.previous.is_some();

        let (core, outcome) = match result {
            Ok(embedding) => {
                let core = IndexRecord::full(preview, embedding.vector, embedding.model, Metadata::new());
                (core, if had_record { Outcome::Updated } else { Outcome::Indexed })
            }
            Err(e) if item.previous.as_ref().is_some_and(IndexRecord::is_full) => {
                warn!(address = %item.address, reason = e.reason(), "embedding failed; keeping existing full record");
                return Outcome::Failed(BuildFailure {
                    address: item.address.to_string(),
                    cause: e.to_string(),
                    remediation: e.remediation().to_string(),
                });
            }
            Err(e) => {
                warn!(address = %item.address, reason = e.reason(), "embedding unavailable; writing basic record");
                let core = IndexRecord::basic(
                    preview,
                    Metadata::new(),
                    basic_note(&e),
                    Some(format!("{}: {}", e.reason(), e)),
                );
                let outcome = Outcome::Basic {
                    reason: e.reason(),
                    remediation: e.remediation(),
                };
                (core, outcome)
            }
        };

        match self.write_merged(&item.address, &core, &item.extracted.metadata) {
            Ok(()) => outcome,
            Err(e) => {
                warn!(address = %item.address, "failed to write record: {}", e);
                Outcome::Failed(BuildFailure {
                    address: item.address.to_string(),
                    cause: e.to_string(),
                    remediation: e.remediation().to_string(),
                })
            }
        }
    }

    fn write_merged(
        &self,
        address: &ContentAddress,
        core: &IndexRecord,
        metadata: &Metadata,
    ) -> Result<(), RecordError> {
        let core_json = serde_json::to_string(core)?;
        let meta_json = serde_json::to_string(metadata)?;
        let record = merge_partials(&core_json, &meta_json)?;
        self.records.put(address, &record)
    }
}

fn record_failure(summary: &mut BuildSummary, failure: BuildFailure) {
    summary.failed += 1;
    summary.failures.push(failure);
}

/// The file itself, or every regular file under a directory in sorted
/// order. Hidden entries and sidecar files are skipped.
fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Cannot access {}", path.display()))?;
    if meta.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        if entry.file_type().is_file() && !is_sidecar(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
