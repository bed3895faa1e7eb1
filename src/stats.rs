//! Index listing: every record with its state, plus totals.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::error::RecordError;
use crate::store::{FsRecordStore, RecordStore};

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub hash: String,
    /// `full`, `basic` or `corrupt`.
    pub state: &'static str,
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListTotals {
    pub total: usize,
    pub full: usize,
    pub basic: usize,
    pub corrupt: usize,
}

pub fn list_records(store: &dyn RecordStore) -> Result<(Vec<ListEntry>, ListTotals), RecordError> {
    let mut entries = Vec::new();
    let mut totals = ListTotals::default();
    for address in store.list()? {
        let (state, title) = match store.get(&address) {
            Ok(Some(record)) => {
                let title = record.meta("title").unwrap_or_default().to_string();
                if record.is_full() {
                    totals.full += 1;
                    ("full", title)
                } else {
                    totals.basic += 1;
                    ("basic", title)
                }
            }
            Ok(None) => continue,
            Err(RecordError::Corrupt { .. }) => {
                totals.corrupt += 1;
                ("corrupt", String::new())
            }
            Err(e) => return Err(e),
        };
        totals.total += 1;
        entries.push(ListEntry {
            hash: address.to_string(),
            state,
            title,
        });
    }
    Ok((entries, totals))
}

pub fn run_list(config: &Config, json: bool) -> Result<()> {
    let store = FsRecordStore::new(&config.index.dir);
    let (entries, totals) = list_records(&store)?;

    if json {
        let out = serde_json::json!({ "records": entries, "totals": totals });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for entry in &entries {
        println!("{:<64}  {:<7}  {}", entry.hash, entry.state, entry.title);
    }
    println!(
        "total={} full={} basic={} corrupt={}",
        totals.total, totals.full, totals.basic, totals.corrupt
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentAddress, IndexRecord, Metadata};
    use crate::store::InMemoryRecordStore;

    #[test]
    fn counts_each_state() {
        let store = InMemoryRecordStore::new();
        let mut meta = Metadata::new();
        meta.insert("metadata_title".into(), "Report".into());
        let full = IndexRecord::full("p".into(), vec![1.0], "m".into(), meta.clone());
        let basic = IndexRecord::basic("p".into(), meta, "n".into(), None);
        store.put(&ContentAddress::parse("QmA").unwrap(), &full).unwrap();
        store.put(&ContentAddress::parse("QmB").unwrap(), &basic).unwrap();
        store.insert_raw(&ContentAddress::parse("QmC").unwrap(), "not json");

        let (entries, totals) = list_records(&store).unwrap();
        let states: Vec<_> = entries.iter().map(|e| e.state).collect();
        assert_eq!(states, vec!["full", "basic", "corrupt"]);
        assert_eq!(entries[0].title, "Report");
        assert_eq!((totals.total, totals.full, totals.basic, totals.corrupt), (3, 1, 1, 1));
    }
}
