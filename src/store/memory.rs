use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::RecordStore;
use crate::error::RecordError;
use crate::models::ContentAddress;

/// Records held as raw JSON bytes in memory.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<BTreeMap<ContentAddress, Vec<u8>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ContentAddress, Vec<u8>>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store bytes without validation, e.g. to plant a corrupt record.
    pub fn insert_raw(&self, address: &ContentAddress, raw: impl Into<Vec<u8>>) {
        self.lock().insert(address.clone(), raw.into());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get_raw(&self, address: &ContentAddress) -> Result<Option<Vec<u8>>, RecordError> {
        Ok(self.lock().get(address).cloned())
    }

    fn write_raw(&self, address: &ContentAddress, json: &str) -> Result<(), RecordError> {
        self.lock().insert(address.clone(), json.as_bytes().to_vec());
        Ok(())
    }

    fn delete(&self, address: &ContentAddress) -> Result<bool, RecordError> {
        Ok(self.lock().remove(address).is_some())
    }

    fn list(&self) -> Result<Vec<ContentAddress>, RecordError> {
        Ok(self.lock().keys().cloned().collect())
    }
}
