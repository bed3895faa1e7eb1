//! Persistence of index records, one JSON document per content address.
//!
//! Implementations provide raw get/write/delete/list; validation, parsing and
//! corruption detection live in the provided methods so every backend
//! behaves the same.
//!
//! | Backend | Used for |
//! |---------|----------|
//! | [`FsRecordStore`] | `<index dir>/<address>.json` |
//! | [`InMemoryRecordStore`] | tests and embedding callers |

mod fs;
mod memory;

pub use fs::FsRecordStore;
pub use memory::InMemoryRecordStore;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::RecordError;
use crate::models::{ContentAddress, IndexRecord};

pub trait RecordStore: Send + Sync {
    /// The stored bytes for `address`, if any. Not necessarily valid UTF-8.
    fn get_raw(&self, address: &ContentAddress) -> Result<Option<Vec<u8>>, RecordError>;

    /// Replace the stored JSON text atomically.
    fn write_raw(&self, address: &ContentAddress, json: &str) -> Result<(), RecordError>;

    /// Returns `false` when there was nothing to delete.
    fn delete(&self, address: &ContentAddress) -> Result<bool, RecordError>;

    /// Every address with a stored record, sorted.
    fn list(&self) -> Result<Vec<ContentAddress>, RecordError>;

    /// Parse the stored record. Unparseable or inconsistent records are
    /// [`RecordError::Corrupt`].
    fn get(&self, address: &ContentAddress) -> Result<Option<IndexRecord>, RecordError> {
        match self.get_raw(address)? {
            Some(raw) => parse_record(address, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Serialize, re-parse and check the record before committing it.
    fn put(&self, address: &ContentAddress, record: &IndexRecord) -> Result<(), RecordError> {
        let json = serde_json::to_string_pretty(record)?;
        let reparsed: IndexRecord =
            serde_json::from_str(&json).map_err(|e| RecordError::Invalid {
                address: address.clone(),
                reason: e.to_string(),
            })?;
        reparsed.check().map_err(|reason| RecordError::Invalid {
            address: address.clone(),
            reason,
        })?;
        self.write_raw(address, &json)
    }
}

fn parse_record(address: &ContentAddress, raw: &[u8]) -> Result<IndexRecord, RecordError> {
    let corrupt = |reason: String| RecordError::Corrupt {
        address: address.clone(),
        reason,
    };
    let text = std::str::from_utf8(raw).map_err(|e| corrupt(e.to_string()))?;
    let record: IndexRecord = serde_json::from_str(text).map_err(|e| corrupt(e.to_string()))?;
    record.check().map_err(corrupt)?;
    Ok(record)
}

/// Merge two partial records (typically the embedding half and the
/// metadata half). Fields of `b` win on conflict.
///
/// Both inputs must be non-empty JSON objects and the result must be a
/// valid record; otherwise nothing is produced.
pub fn merge_partials(a: &str, b: &str) -> Result<IndexRecord, RecordError> {
    let left = parse_partial(a, "first")?;
    let right = parse_partial(b, "second")?;
    let mut merged = left;
    merged.extend(right);
    let record: IndexRecord = serde_json::from_value(Value::Object(merged))
        .map_err(|e| RecordError::Merge(format!("merged record is incomplete: {}", e)))?;
    record.check().map_err(RecordError::Merge)?;
    Ok(record)
}

fn parse_partial(raw: &str, which: &str) -> Result<Map<String, Value>, RecordError> {
    if raw.trim().is_empty() {
        return Err(RecordError::Merge(format!("{} partial is empty", which)));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) if !map.is_empty() => Ok(map),
        Ok(Value::Object(_)) => Err(RecordError::Merge(format!("{} partial is empty", which))),
        Ok(_) => Err(RecordError::Merge(format!("{} partial is not an object", which))),
        Err(e) => Err(RecordError::Merge(format!("{} partial is malformed: {}", which, e))),
    }
}

/// Every readable record in address order. Corrupt records are logged and
/// returned separately.
pub fn load_all(
    store: &dyn RecordStore,
) -> Result<(Vec<(ContentAddress, IndexRecord)>, Vec<RecordError>), RecordError> {
    let mut records = Vec::new();
    let mut corrupt = Vec::new();
    for address in store.list()? {
        match store.get(&address) {
            Ok(Some(record)) => records.push((address, record)),
            Ok(None) => {}
            Err(e @ RecordError::Corrupt { .. }) => {
                warn!(address = %address, "skipping corrupt record: {}", e);
                corrupt.push(e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok((records, corrupt))
}
