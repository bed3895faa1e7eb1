//! `index`, `build` and `remove` commands.
//!
//! Wires the configured content store, record store, embedder and
//! extraction pipeline into an [`IndexBuilder`] and reports the summary:
//! one `key=value` line on stdout (or JSON with `--json`), one line per
//! failure on stderr.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::builder::{BuildOptions, IndexBuilder};
use crate::config::Config;
use crate::content_store::create_content_store;
use crate::embedding::create_embedder;
use crate::extract::ExtractionPipeline;
use crate::inference::InferenceClient;
use crate::models::{BuildSummary, ContentAddress};
use crate::progress::ProgressMode;
use crate::store::{FsRecordStore, RecordStore};

/// Extraction chains for this config; remote steps only with a credential.
pub fn pipeline_for(config: &Config) -> ExtractionPipeline {
    let remote = InferenceClient::from_config(&config.embedding).ok();
    ExtractionPipeline::standard(&config.extraction, remote)
}

pub async fn run_index(config: &Config, target: &str, force: bool, json: bool) -> Result<()> {
    let content = create_content_store(&config.store)?;
    let records = FsRecordStore::new(&config.index.dir);
    let embedder = create_embedder(&config.embedding);
    let pipeline = pipeline_for(config);
    let builder = IndexBuilder::new(
        content.as_ref(),
        &records,
        embedder.as_ref(),
        &pipeline,
        BuildOptions::from_config(config),
    );

    let path = Path::new(target);
    let summary = if path.exists() {
        builder.index_path(path, force).await?
    } else {
        let address = ContentAddress::parse(target)
            .with_context(|| format!("'{}' is neither a readable path nor a content address", target))?;
        builder.index_address(&address, force).await
    };

    print_summary(&summary, json)?;
    if summary.failed > 0 {
        bail!("{} of {} items failed to index", summary.failed, summary.processed);
    }
    Ok(())
}

pub async fn run_build(config: &Config, json: bool, progress: ProgressMode) -> Result<()> {
    let content = create_content_store(&config.store)?;
    let records = FsRecordStore::new(&config.index.dir);
    let embedder = create_embedder(&config.embedding);
    let pipeline = pipeline_for(config);
    let summary = IndexBuilder::new(
        content.as_ref(),
        &records,
        embedder.as_ref(),
        &pipeline,
        BuildOptions::from_config(config),
    )
    .with_progress(progress.reporter())
    .build_all()
    .await?;

    print_summary(&summary, json)
}

pub fn run_remove(config: &Config, address: &str) -> Result<()> {
    let address = ContentAddress::parse(address)?;
    let records = FsRecordStore::new(&config.index.dir);
    if !records.delete(&address)? {
        bail!("No index record for {}", address);
    }
    println!("removed {}", address);
    Ok(())
}

fn print_summary(summary: &BuildSummary, json: bool) -> Result<()> {
    for failure in &summary.failures {
        eprintln!(
            "failed {}: {}\n  hint: {}",
            failure.address, failure.cause, failure.remediation
        );
    }
    for (reason, remediation) in &summary.basic_hints {
        eprintln!(
            "indexed without embeddings ({})\n  hint: {}",
            reason, remediation
        );
    }
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{}", summary);
    }
    Ok(())
}
