//! End-to-end indexing and search through the library API, using a local
//! blob store, an in-memory record store and a deterministic embedder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ipfs_search::builder::{BuildOptions, IndexBuilder, BASIC_NOTE};
use ipfs_search::config::ExtractionConfig;
use ipfs_search::content_store::{ContentStore, LocalBlobStore};
use ipfs_search::embedding::{DisabledEmbedder, Embedder, Embedding};
use ipfs_search::error::InferenceError;
use ipfs_search::extract::ExtractionPipeline;
use ipfs_search::models::{ContentAddress, IndexRecord, Metadata};
use ipfs_search::progress::{BuildProgressEvent, BuildProgressReporter};
use ipfs_search::search::search;
use ipfs_search::store::{InMemoryRecordStore, RecordStore};
use tempfile::TempDir;

/// Vectors derived from the text so equal texts embed equally. Texts
/// containing `FAIL` are rejected.
struct FakeEmbedder {
    calls: AtomicUsize,
}

impl FakeEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn texts_embedded(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_hint(&self) -> &str {
        "auto"
    }

    async fn embed(&self, text: &str) -> Result<Embedding, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("FAIL") {
            return Err(InferenceError::RateLimited);
        }
        let lower = text.to_lowercase();
        let vector = vec![
            1.0 + lower.matches("revenue").count() as f32,
            1.0 + lower.matches("cat").count() as f32,
            (text.len() % 5) as f32 + 0.5,
        ];
        Ok(Embedding {
            vector,
            model: "fake-model".into(),
        })
    }
}

struct Harness {
    dir: TempDir,
    blobs: LocalBlobStore,
    records: InMemoryRecordStore,
    pipeline: ExtractionPipeline,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let blobs = LocalBlobStore::new(&dir.path().join("blobs"));
        let config = ExtractionConfig {
            remote: false,
            pdftotext_bin: "ipfs-search-test-missing-pdftotext".into(),
            pdfinfo_bin: "ipfs-search-test-missing-pdfinfo".into(),
        };
        Self {
            dir,
            blobs,
            records: InMemoryRecordStore::new(),
            pipeline: ExtractionPipeline::standard(&config, None),
        }
    }

    fn builder<'a>(&'a self, embedder: &'a dyn Embedder, batch_size: usize) -> IndexBuilder<'a> {
        IndexBuilder::new(
            &self.blobs,
            &self.records,
            embedder,
            &self.pipeline,
            BuildOptions {
                preview_chars: 200,
                max_chars: 8000,
                batch_size,
                batch_delay: Duration::ZERO,
            },
        )
    }

    fn write_file(&self, name: &str, body: &str) -> std::path::PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    fn only_record(&self) -> (ContentAddress, IndexRecord) {
        let addresses = self.records.list().unwrap();
        assert_eq!(addresses.len(), 1, "expected exactly one record");
        let record = self.records.get(&addresses[0]).unwrap().unwrap();
        (addresses[0].clone(), record)
    }
}

fn meta(title: &str) -> Metadata {
    let mut m = Metadata::new();
    m.insert("metadata_title".into(), title.into());
    m
}

#[tokio::test]
async fn text_file_gets_title_and_preview() {
    let h = Harness::new();
    let embedder = FakeEmbedder::new();
    let path = h.write_file("report.txt", "Quarterly Report\nRevenue grew 12%.");

    let summary = h.builder(&embedder, 10).index_path(&path, false).await.unwrap();
    assert_eq!((summary.processed, summary.indexed), (1, 1));

    let (address, record) = h.only_record();
    assert!(address.as_str().starts_with("sha256-"));
    assert_eq!(record.meta("title"), Some("Quarterly Report"));
    assert!(record.text_preview.starts_with("Quarterly Report Revenue grew 12%."));
    assert!(record.is_full());
    assert_eq!(record.model_used, "fake-model");
    assert_eq!(record.dimensions, 3);
}

#[tokio::test]
async fn no_credential_writes_basic_record() {
    let h = Harness::new();
    let path = h.write_file("report.txt", "Quarterly Report\nRevenue grew 12%.");

    let summary = h
        .builder(&DisabledEmbedder, 10)
        .index_path(&path, false)
        .await
        .unwrap();
    assert_eq!((summary.basic, summary.failed), (1, 0));

    let (_, record) = h.only_record();
    assert_eq!(record.embedding, None);
    assert_eq!(record.model_used, "none");
    assert_eq!(record.dimensions, 0);
    let note = record.note.as_deref().unwrap();
    assert!(note.starts_with(BASIC_NOTE));
    assert!(note.contains("IPFS_SEARCH_API_KEY"), "note: {}", note);
    assert!(record.error.as_deref().unwrap().starts_with("no_credential"));
    assert!(summary.basic_hints["no_credential"].contains("IPFS_SEARCH_API_KEY"));
    assert_eq!(record.meta("title"), Some("Quarterly Report"));
}

#[tokio::test]
async fn rebuild_skips_full_upgrades_basic_indexes_new() {
    let h = Harness::new();
    let mut addresses = Vec::new();
    for i in 0..10 {
        addresses.push(
            h.blobs
                .add_bytes(format!("Document {}\nBody text number {}.", i, i).as_bytes())
                .unwrap(),
        );
    }
    addresses.sort();
    for address in &addresses[..6] {
        let rec = IndexRecord::full("old".into(), vec![1.0, 0.0, 0.0], "m".into(), meta("Old"));
        h.records.put(address, &rec).unwrap();
    }
    for address in &addresses[6..8] {
        let rec = IndexRecord::basic("old".into(), meta("Old"), "n".into(), None);
        h.records.put(address, &rec).unwrap();
    }

    let embedder = FakeEmbedder::new();
    let summary = h.builder(&embedder, 10).build_all().await.unwrap();

    assert_eq!(summary.processed, 10);
    assert_eq!(summary.skipped, 6);
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.indexed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(embedder.texts_embedded(), 4);

    for address in &addresses[..6] {
        let rec = h.records.get(address).unwrap().unwrap();
        assert_eq!(rec.text_preview, "old", "full record was re-extracted");
    }
    for address in &addresses[6..] {
        assert!(h.records.get(address).unwrap().unwrap().is_full());
    }
}

#[tokio::test]
async fn second_build_changes_nothing() {
    let h = Harness::new();
    for body in ["alpha notes", "beta notes", "gamma notes"] {
        h.blobs.add_bytes(body.as_bytes()).unwrap();
    }
    let embedder = FakeEmbedder::new();

    let first = h.builder(&embedder, 2).build_all().await.unwrap();
    assert_eq!(first.indexed, 3);
    let snapshot: Vec<_> = h
        .records
        .list()
        .unwrap()
        .iter()
        .map(|a| h.records.get_raw(a).unwrap())
        .collect();

    let second = h.builder(&embedder, 2).build_all().await.unwrap();
    assert_eq!((second.indexed, second.updated, second.skipped), (0, 0, 3));
    let after: Vec<_> = h
        .records
        .list()
        .unwrap()
        .iter()
        .map(|a| h.records.get_raw(a).unwrap())
        .collect();
    assert_eq!(snapshot, after);
}

#[tokio::test]
async fn full_record_is_never_downgraded() {
    let h = Harness::new();
    let path = h.write_file("notes.md", "# Field Notes\nThe cat sat.");
    let embedder = FakeEmbedder::new();
    h.builder(&embedder, 10).index_path(&path, false).await.unwrap();

    let forced = h
        .builder(&DisabledEmbedder, 10)
        .index_path(&path, true)
        .await
        .unwrap();
    assert_eq!(forced.failed, 1);
    assert_eq!(forced.basic, 0);
    assert!(h.only_record().1.is_full());

    let rebuilt = h.builder(&DisabledEmbedder, 10).build_all().await.unwrap();
    assert_eq!(rebuilt.skipped, 1);
    assert!(h.only_record().1.is_full());
}

#[tokio::test]
async fn unforced_reindex_of_full_record_is_skipped() {
    let h = Harness::new();
    let path = h.write_file("notes.md", "# Field Notes\nThe cat sat.");
    let embedder = FakeEmbedder::new();
    h.builder(&embedder, 10).index_path(&path, false).await.unwrap();

    let again = h.builder(&embedder, 10).index_path(&path, false).await.unwrap();
    assert_eq!((again.processed, again.skipped), (1, 1));
    assert_eq!(embedder.texts_embedded(), 1);
}

#[tokio::test]
async fn basic_record_upgrades_when_service_returns() {
    let h = Harness::new();
    let path = h.write_file("report.txt", "Quarterly Report\nRevenue grew 12%.");
    h.builder(&DisabledEmbedder, 10).index_path(&path, false).await.unwrap();
    assert!(!h.only_record().1.is_full());

    let summary = h.builder(&FakeEmbedder::new(), 10).build_all().await.unwrap();
    assert_eq!(summary.updated, 1);
    let (_, record) = h.only_record();
    assert!(record.is_full());
    assert_eq!(record.note, None);
    assert_eq!(record.meta("title"), Some("Quarterly Report"));
}

#[tokio::test]
async fn failures_are_isolated() {
    let h = Harness::new();
    let good = h.blobs.add_bytes(b"a healthy document").unwrap();
    let flaky = h.blobs.add_bytes(b"this one will FAIL to embed").unwrap();
    let broken = h.blobs.add_bytes(b"record on disk is corrupt").unwrap();
    h.records.insert_raw(&broken, "{\"text_preview\": \"trunc");

    let summary = h.builder(&FakeEmbedder::new(), 1).build_all().await.unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.indexed, 1);
    assert_eq!(summary.basic, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].address, broken.to_string());

    assert!(h.records.get(&good).unwrap().unwrap().is_full());
    let degraded = h.records.get(&flaky).unwrap().unwrap();
    assert!(degraded.error.as_deref().unwrap().starts_with("rate_limited"));
    assert_eq!(
        h.records.get_raw(&broken).unwrap().as_deref(),
        Some(&b"{\"text_preview\": \"trunc"[..])
    );
}

#[tokio::test]
async fn directory_indexing_applies_sidecars() {
    let h = Harness::new();
    h.write_file("docs/a.txt", "Meeting Minutes\nWe met.");
    h.write_file(
        "docs/a.txt.metadata.txt",
        "https://example.org/minutes\nmeetings, weekly\nProject: Apollo\n",
    );
    h.write_file("docs/nested/b.md", "# Roadmap\nShip it.");

    let summary = h
        .builder(&FakeEmbedder::new(), 10)
        .index_path(&h.dir.path().join("docs"), false)
        .await
        .unwrap();
    assert_eq!((summary.processed, summary.indexed), (2, 2));

    let records: Vec<_> = h
        .records
        .list()
        .unwrap()
        .iter()
        .map(|a| h.records.get(a).unwrap().unwrap())
        .collect();
    let minutes = records
        .iter()
        .find(|r| r.meta("title") == Some("Meeting Minutes"))
        .unwrap();
    assert_eq!(minutes.meta("source_url"), Some("https://example.org/minutes"));
    assert_eq!(minutes.meta("tags"), Some("meetings, weekly"));
    assert_eq!(minutes.meta("custom_project"), Some("Apollo"));
    assert!(records.iter().any(|r| r.meta("title") == Some("Roadmap")));
}

#[tokio::test]
async fn fetched_objects_get_placeholder_titles() {
    let h = Harness::new();
    let address = h.blobs.add_bytes(&[0u8, 159, 146, 150, 0, 1]).unwrap();
    let summary = h
        .builder(&FakeEmbedder::new(), 10)
        .index_address(&address, false)
        .await;
    assert_eq!(summary.indexed, 1);

    let (_, record) = h.only_record();
    assert_eq!(
        record.meta("title").unwrap(),
        format!("IPFS Content {}", address.short(12))
    );
    assert!(record.text_preview.starts_with("Binary file: "));
}

#[tokio::test]
async fn unknown_address_fails_cleanly() {
    let h = Harness::new();
    let missing = ContentAddress::parse("sha256-0000").unwrap();
    let summary = h
        .builder(&FakeEmbedder::new(), 10)
        .index_address(&missing, false)
        .await;
    assert_eq!(summary.failed, 1);
    assert!(h.records.is_empty());
}

#[tokio::test]
async fn indexed_content_is_searchable() {
    let h = Harness::new();
    let report = h.write_file("report.txt", "Quarterly Report\nRevenue grew 12%.");
    std::fs::write(
        h.dir.path().join("report.txt.metadata.txt"),
        "https://example.org/q3\nfinance\nAuthor: ignored\n",
    )
    .unwrap();
    let cats = h.write_file("cats.txt", "Cat Facts\nA cat sleeps a lot.");
    let embedder = FakeEmbedder::new();
    h.builder(&embedder, 10).index_path(&report, false).await.unwrap();
    h.builder(&embedder, 10).index_path(&cats, false).await.unwrap();

    let results = search(&h.records, &embedder, "quarterly report").await.unwrap();
    assert_eq!(results[0].title, "Quarterly Report");
    assert_eq!(results[0].source, "https://example.org/q3");
    assert_eq!(results[0].tags, "finance");
    assert!(results[0].metadata_score >= 180.0);
    assert!(results.len() <= 5);

    let first = search(&h.records, &embedder, "cat").await.unwrap();
    let second = search(&h.records, &embedder, "cat").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn search_requires_embedder() {
    let h = Harness::new();
    let err = search(&h.records, &DisabledEmbedder, "anything").await.unwrap_err();
    assert!(err.remediation().contains("IPFS_SEARCH_API_KEY"));
}

/// Counts the records already stored each time a batch is sent.
struct CountingEmbedder<'a> {
    records: &'a InMemoryRecordStore,
    stored_at_batch: Mutex<Vec<usize>>,
}

#[async_trait]
impl<'a> Embedder for CountingEmbedder<'a> {
    fn model_hint(&self) -> &str {
        "auto"
    }

    async fn embed(&self, _text: &str) -> Result<Embedding, InferenceError> {
        Ok(Embedding {
            vector: vec![1.0, 0.0],
            model: "fake-model".into(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, InferenceError> {
        self.stored_at_batch.lock().unwrap().push(self.records.len());
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

#[derive(Clone, Default)]
struct RecordedProgress(Arc<Mutex<Vec<BuildProgressEvent>>>);

impl BuildProgressReporter for RecordedProgress {
    fn report(&self, event: BuildProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}

#[tokio::test]
async fn each_batch_is_written_before_the_next_is_sent() {
    let h = Harness::new();
    for i in 0..25 {
        h.blobs.add_bytes(format!("note number {}", i).as_bytes()).unwrap();
    }
    let embedder = CountingEmbedder {
        records: &h.records,
        stored_at_batch: Mutex::new(Vec::new()),
    };
    let progress = RecordedProgress::default();

    let summary = h
        .builder(&embedder, 10)
        .with_progress(Box::new(progress.clone()))
        .build_all()
        .await
        .unwrap();
    assert_eq!(summary.indexed, 25);
    assert_eq!(*embedder.stored_at_batch.lock().unwrap(), vec![0, 10, 20]);

    let embedded: Vec<(u64, u64)> = progress
        .0
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            BuildProgressEvent::Embedding { n, total } => Some((*n, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(embedded, vec![(10, 25), (20, 25), (25, 25)]);
}
