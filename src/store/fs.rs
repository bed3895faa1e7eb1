use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::RecordStore;
use crate::error::RecordError;
use crate::models::ContentAddress;

/// Records as `<dir>/<address>.json`.
///
/// Writes go to a uniquely named temp file in the same directory and are
/// renamed into place, so readers see either the old or the new record.
/// Concurrent writers to one address: the last rename wins.
pub struct FsRecordStore {
    dir: PathBuf,
}

impl FsRecordStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, address: &ContentAddress) -> PathBuf {
        self.dir.join(format!("{}.json", address))
    }
}

impl RecordStore for FsRecordStore {
    fn get_raw(&self, address: &ContentAddress) -> Result<Option<Vec<u8>>, RecordError> {
        match std::fs::read(self.path_for(address)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_raw(&self, address: &ContentAddress, json: &str) -> Result<(), RecordError> {
        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.json.tmp-", address))
            .tempfile_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(address))
            .map_err(|e| RecordError::Io(e.error))?;
        Ok(())
    }

    fn delete(&self, address: &ContentAddress) -> Result<bool, RecordError> {
        match std::fs::remove_file(self.path_for(address)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<ContentAddress>, RecordError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().to_string();
            // Temp files start with '.', which addresses never do.
            if let Some(stem) = name.strip_suffix(".json") {
                if let Ok(address) = ContentAddress::parse(stem) {
                    out.push(address);
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexRecord, Metadata};

    #[test]
    fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRecordStore::new(&dir.path().join("index"));
        let addr = ContentAddress::parse("QmReport").unwrap();
        let rec = IndexRecord::full("p".into(), vec![0.5, 0.5], "m".into(), Metadata::new());

        store.put(&addr, &rec).unwrap();
        assert!(store.path_for(&addr).exists());
        assert_eq!(store.get(&addr).unwrap(), Some(rec));
        assert_eq!(store.list().unwrap(), vec![addr.clone()]);

        assert!(store.delete(&addr).unwrap());
        assert!(!store.delete(&addr).unwrap());
        assert!(store.get(&addr).unwrap().is_none());
    }

    #[test]
    fn overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRecordStore::new(dir.path());
        let addr = ContentAddress::parse("QmX").unwrap();
        let basic = IndexRecord::basic("p".into(), Metadata::new(), "n".into(), None);
        store.put(&addr, &basic).unwrap();
        let full = IndexRecord::full("p".into(), vec![1.0], "m".into(), Metadata::new());
        store.put(&addr, &full).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(store.get(&addr).unwrap().unwrap().is_full());
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRecordStore::new(dir.path());
        std::fs::write(dir.path().join("QmBad.json"), "{\"text_preview\": \"cut").unwrap();
        let addr = ContentAddress::parse("QmBad").unwrap();
        assert!(matches!(store.get(&addr), Err(RecordError::Corrupt { .. })));
    }

    #[test]
    fn non_utf8_truncation_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRecordStore::new(dir.path());
        let mut cut = b"{\"text_preview\": \"caf".to_vec();
        cut.push(0xC3);
        std::fs::write(dir.path().join("QmCut.json"), cut).unwrap();
        let addr = ContentAddress::parse("QmCut").unwrap();
        assert!(matches!(store.get(&addr), Err(RecordError::Corrupt { .. })));
        let (records, corrupt) = super::super::load_all(&store).unwrap();
        assert!(records.is_empty());
        assert_eq!(corrupt.len(), 1);
    }

    #[test]
    fn missing_dir_lists_nothing() {
        let store = FsRecordStore::new(Path::new("/nonexistent/ipfs-search/index"));
        assert!(store.list().unwrap().is_empty());
    }
}
