//! Snapshot store over exported collections on the local filesystem.
//!
//! Reads a directory produced by a collection export (one file per
//! collection, either a JSON array or newline-delimited JSON) and serves the
//! pipeline's reads from memory. Useful for offline reindexing and for
//! development without a live database.
//!
//! ## Directory Layout
//!
//! ```text
//! {root}/
//! ├── hospitals.json                      # required
//! ├── hospitaltimes.json                  # raw opening hours
//! ├── pharmacies.json                     # nearby candidates
//! ├── hospitalsubjects.json               # satellites, keyed by ykiho
//! ├── hospital_equipment.ndjson
//! └── ...
//! ```
//!
//! Missing optional files are treated as empty collections. A missing root
//! directory is reported as a network error so the connection layer retries
//! it (e.g. a network mount that is not up yet).

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::lenient::value_to_string;
use crate::models::{Hospital, Pharmacy, RawSchedule, SatelliteKind};
use crate::storage::FacilityStore;

const HOSPITALS: &str = "hospitals";
const TIMES: &str = "hospitaltimes";
const PHARMACIES: &str = "pharmacies";

#[derive(Debug, Default)]
struct Snapshot {
    hospitals: BTreeMap<String, Hospital>,
    satellites: HashMap<SatelliteKind, HashMap<String, Vec<Value>>>,
    schedules: HashMap<String, RawSchedule>,
    pharmacies: Vec<Pharmacy>,
}

/// Filesystem-backed primary store.
#[derive(Debug)]
pub struct SnapshotStore {
    root_dir: PathBuf,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    /// Create a store rooted at the given export directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            snapshot: RwLock::new(None),
        }
    }

    fn current(&self, context: &str) -> Result<Arc<Snapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| AppError::network(context, "snapshot store not connected"))
    }

    /// Read a collection file, returning None if it doesn't exist.
    async fn read_collection(&self, name: &str) -> Result<Option<Vec<Value>>> {
        for ext in ["json", "ndjson"] {
            let path = self.root_dir.join(format!("{name}.{ext}"));
            match tokio::fs::read(&path).await {
                Ok(bytes) => return parse_documents(&bytes).map(Some),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(AppError::Io(e)),
            }
        }
        Ok(None)
    }

    async fn load(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();

        let hospitals = self.read_collection(HOSPITALS).await?.ok_or_else(|| {
            AppError::store(format!(
                "{HOSPITALS} collection missing in {}",
                self.root_dir.display()
            ))
        })?;
        let mut skipped = 0usize;
        for value in hospitals {
            match serde_json::from_value::<Hospital>(value) {
                Ok(hospital) => {
                    snapshot.hospitals.insert(hospital.id.clone(), hospital);
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            log::warn!("Skipped {} hospital rows without a usable _id", skipped);
        }

        for kind in SatelliteKind::ALL {
            let rows = self.read_collection(kind.collection()).await?.unwrap_or_default();
            let by_key = snapshot.satellites.entry(kind).or_default();
            for row in rows {
                if let Some(key) = row.get("ykiho").and_then(value_to_string) {
                    by_key.entry(key).or_default().push(row);
                }
            }
        }

        for row in self.read_collection(TIMES).await?.unwrap_or_default() {
            if let Value::Object(mut map) = row {
                let key = map.get("ykiho").and_then(value_to_string);
                if let Some(key) = key {
                    map.remove("_id");
                    map.remove("ykiho");
                    snapshot.schedules.insert(key, map);
                }
            }
        }

        snapshot.pharmacies = self
            .read_collection(PHARMACIES)
            .await?
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| serde_json::from_value::<Pharmacy>(row).ok())
            .filter(|p| p.position().is_some())
            .collect();

        Ok(snapshot)
    }
}

/// Parse a JSON array or newline-delimited JSON documents.
fn parse_documents(bytes: &[u8]) -> Result<Vec<Value>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AppError::store(format!("collection is not valid UTF-8: {e}")))?;
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(AppError::from))
        .collect()
}

#[async_trait]
impl FacilityStore for SnapshotStore {
    async fn connect(&self) -> Result<()> {
        match tokio::fs::metadata(&self.root_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(AppError::store(format!(
                    "{} is not a directory",
                    self.root_dir.display()
                )));
            }
            Err(e) => {
                return Err(AppError::network(
                    "connect",
                    format!("{} unreachable: {}", self.root_dir.display(), e),
                ));
            }
        }

        let snapshot = self.load().await?;
        log::info!(
            "Loaded snapshot from {}: {} hospitals, {} schedules, {} pharmacies",
            self.root_dir.display(),
            snapshot.hospitals.len(),
            snapshot.schedules.len(),
            snapshot.pharmacies.len()
        );
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(snapshot));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn ping(&self) -> Result<()> {
        self.current("ping")?;
        tokio::fs::metadata(&self.root_dir)
            .await
            .map(|_| ())
            .map_err(|e| AppError::network("ping", e))
    }

    async fn disconnect(&self) -> Result<()> {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    async fn count_hospitals(&self) -> Result<u64> {
        Ok(self.current("count")?.hospitals.len() as u64)
    }

    async fn hospitals_after(&self, after: Option<&str>, limit: usize) -> Result<Vec<Hospital>> {
        let snapshot = self.current("hospitals_after")?;
        let page = match after {
            Some(key) => snapshot
                .hospitals
                .range::<str, _>((
                    std::ops::Bound::Excluded(key),
                    std::ops::Bound::Unbounded,
                ))
                .take(limit)
                .map(|(_, h)| h.clone())
                .collect(),
            None => snapshot.hospitals.values().take(limit).cloned().collect(),
        };
        Ok(page)
    }

    async fn satellite(&self, kind: SatelliteKind, ykiho: &str) -> Result<Vec<Value>> {
        let snapshot = self.current("satellite")?;
        Ok(snapshot
            .satellites
            .get(&kind)
            .and_then(|rows| rows.get(ykiho))
            .cloned()
            .unwrap_or_default())
    }

    async fn schedule(&self, ykiho: &str) -> Result<Option<RawSchedule>> {
        Ok(self.current("schedule")?.schedules.get(ykiho).cloned())
    }

    async fn pharmacies_with_position(&self) -> Result<Vec<Pharmacy>> {
        Ok(self.current("pharmacies")?.pharmacies.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    async fn write(dir: &Path, name: &str, body: &str) {
        tokio::fs::write(dir.join(name), body).await.unwrap();
    }

    async fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let hospitals = json!([
            { "_id": { "$oid": "0002" }, "ykiho": "B", "yadmNm": "둘째병원" },
            { "_id": { "$oid": "0001" }, "ykiho": "A", "yadmNm": "첫째병원", "YPos": 37.5, "XPos": 127.0 },
            { "yadmNm": "no id" }
        ]);
        write(dir.path(), "hospitals.json", &hospitals.to_string()).await;
        write(
            dir.path(),
            "hospital_equipment.ndjson",
            "{\"ykiho\":\"A\",\"typeCd\":\"01\",\"typeCdNm\":\"CT\",\"typeCnt\":1}\n\n{\"ykiho\":\"A\",\"typeCd\":\"02\",\"typeCdNm\":\"MRI\",\"typeCnt\":1}\n",
        )
        .await;
        write(
            dir.path(),
            "hospitaltimes.json",
            &json!([{ "_id": "t1", "ykiho": "A", "trmtMonStart": "09:00" }]).to_string(),
        )
        .await;
        write(
            dir.path(),
            "pharmacies.json",
            &json!([
                { "yadmNm": "약국1", "Ypos": "37.5", "Xpos": "127.0" },
                { "yadmNm": "좌표없음" }
            ])
            .to_string(),
        )
        .await;
        dir
    }

    #[tokio::test]
    async fn test_load_and_page() {
        let dir = fixture().await;
        let store = SnapshotStore::new(dir.path());
        store.connect().await.unwrap();

        assert_eq!(store.count_hospitals().await.unwrap(), 2);
        let first = store.hospitals_after(None, 1).await.unwrap();
        assert_eq!(first[0].id, "0001");
        let second = store.hospitals_after(Some("0001"), 10).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "0002");
    }

    #[tokio::test]
    async fn test_satellites_schedules_and_pharmacies() {
        let dir = fixture().await;
        let store = SnapshotStore::new(dir.path());
        store.connect().await.unwrap();

        assert_eq!(
            store.satellite(SatelliteKind::Equipment, "A").await.unwrap().len(),
            2
        );
        assert!(store.satellite(SatelliteKind::Subjects, "A").await.unwrap().is_empty());

        let times = store.schedule("A").await.unwrap().unwrap();
        assert!(times.contains_key("trmtMonStart"));
        assert!(!times.contains_key("ykiho"));
        assert!(store.schedule("B").await.unwrap().is_none());

        assert_eq!(store.pharmacies_with_position().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_directory_is_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("not-mounted"));

        let err = store.connect().await.unwrap_err();
        assert!(err.is_network());
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn test_missing_hospitals_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let err = store.connect().await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }

    #[tokio::test]
    async fn test_reads_after_disconnect_fail() {
        let dir = fixture().await;
        let store = SnapshotStore::new(dir.path());
        store.connect().await.unwrap();
        store.disconnect().await.unwrap();

        assert!(store.hospitals_after(None, 10).await.unwrap_err().is_network());
    }

    #[test]
    fn test_parse_documents_formats() {
        assert_eq!(parse_documents(b"").unwrap().len(), 0);
        assert_eq!(parse_documents(b"[{\"a\":1},{\"a\":2}]").unwrap().len(), 2);
        assert_eq!(parse_documents(b"{\"a\":1}\n{\"a\":2}\n").unwrap().len(), 2);
        assert!(parse_documents(b"{\"a\":").is_err());
    }
}
