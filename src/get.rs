//! Metadata retrieval for one record or the whole index.
//!
//! Used by `ipfs-search metadata <address>` and `metadata --all`. Field
//! values are returned exactly as stored.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::error::RecordError;
use crate::models::{ContentAddress, IndexRecord, Metadata};
use crate::store::{load_all, FsRecordStore, RecordStore};

#[derive(Debug, Clone, Serialize)]
pub struct MetadataResponse {
    pub hash: String,
    pub state: &'static str,
    pub model_used: String,
    pub dimensions: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: Metadata,
}

impl MetadataResponse {
    pub fn from_record(address: &ContentAddress, record: IndexRecord) -> Self {
        Self {
            hash: address.to_string(),
            state: if record.is_full() { "full" } else { "basic" },
            model_used: record.model_used,
            dimensions: record.dimensions,
            timestamp: record.timestamp,
            note: record.note,
            error: record.error,
            metadata: record.metadata,
        }
    }
}

/// Metadata of one record; `Ok(None)` when the address is not indexed.
pub fn get_metadata(
    store: &dyn RecordStore,
    address: &ContentAddress,
) -> Result<Option<MetadataResponse>, RecordError> {
    Ok(store
        .get(address)?
        .map(|record| MetadataResponse::from_record(address, record)))
}

/// Metadata of every readable record. Corrupt records are skipped with a
/// warning and counted in the second value.
pub fn all_metadata(store: &dyn RecordStore) -> Result<(Vec<MetadataResponse>, usize), RecordError> {
    let (records, corrupt) = load_all(store)?;
    let responses = records
        .into_iter()
        .map(|(address, record)| MetadataResponse::from_record(&address, record))
        .collect();
    Ok((responses, corrupt.len()))
}

pub fn run_metadata(config: &Config, address: Option<&str>, all: bool, json: bool) -> Result<()> {
    let store = FsRecordStore::new(&config.index.dir);

    let responses = match (address, all) {
        (_, true) => {
            let (responses, skipped) = all_metadata(&store)?;
            if skipped > 0 {
                eprintln!("{} corrupt record(s) skipped", skipped);
            }
            responses
        }
        (Some(raw), false) => {
            let address = ContentAddress::parse(raw)?;
            match get_metadata(&store, &address) {
                Ok(Some(response)) => vec![response],
                Ok(None) => bail!("No index record for {}", address),
                Err(e) => return Err(anyhow!("{}\n  hint: {}", e, e.remediation())),
            }
        }
        (None, false) => bail!("Pass a content address or --all"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&responses)?);
        return Ok(());
    }

    for response in &responses {
        println!("--- {} ({}) ---", response.hash, response.state);
        println!("model_used:   {}", response.model_used);
        println!("dimensions:   {}", response.dimensions);
        println!("indexed_at:   {}", response.timestamp.to_rfc3339());
        if let Some(note) = &response.note {
            println!("note:         {}", note);
        }
        if let Some(error) = &response.error {
            println!("error:        {}", error);
        }
        for (key, value) in &response.metadata {
            println!("{}: {}", key.trim_start_matches("metadata_"), value);
        }
        println!();
    }
    Ok(())
}
