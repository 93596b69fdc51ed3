// src/storage/memory.rs

//! In-process store and index.
//!
//! Used for dry runs and tests. Both backends can be told to fail specific
//! calls so retry and isolation paths can be exercised deterministically.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Hospital, HospitalDocument, Pharmacy, RawSchedule, SatelliteKind};
use crate::storage::{
    BulkAction, BulkItemOutcome, BulkResponse, FacilityStore, Refresh, SearchIndex,
};

#[derive(Debug, Default)]
struct StoreFaults {
    connects: u32,
    pings: u32,
    pages_network: u32,
    pages_other: u32,
    pharmacies: u32,
    satellites: HashSet<(SatelliteKind, String)>,
}

#[derive(Debug, Default)]
struct StoreState {
    connected: bool,
    hospitals: BTreeMap<String, Hospital>,
    satellites: HashMap<(SatelliteKind, String), Vec<Value>>,
    schedules: HashMap<String, RawSchedule>,
    pharmacies: Vec<Pharmacy>,
    faults: StoreFaults,
    connect_calls: u32,
    served_pages: Vec<Vec<String>>,
}

/// Primary store held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_hospital(&self, hospital: Hospital) {
        self.state().hospitals.insert(hospital.id.clone(), hospital);
    }

    pub fn insert_satellite(&self, kind: SatelliteKind, ykiho: &str, row: Value) {
        self.state()
            .satellites
            .entry((kind, ykiho.to_string()))
            .or_default()
            .push(row);
    }

    pub fn insert_schedule(&self, ykiho: &str, raw: RawSchedule) {
        self.state().schedules.insert(ykiho.to_string(), raw);
    }

    pub fn insert_pharmacy(&self, pharmacy: Pharmacy) {
        self.state().pharmacies.push(pharmacy);
    }

    /// Fail the next `n` connection attempts with a network error.
    pub fn fail_next_connects(&self, n: u32) {
        self.state().faults.connects = n;
    }

    pub fn fail_next_pings(&self, n: u32) {
        self.state().faults.pings = n;
    }

    /// Fail the next `n` page reads with a network error.
    pub fn fail_next_pages_network(&self, n: u32) {
        self.state().faults.pages_network = n;
    }

    /// Fail the next `n` page reads with a non-network error.
    pub fn fail_next_pages(&self, n: u32) {
        self.state().faults.pages_other = n;
    }

    pub fn fail_next_pharmacy_reads(&self, n: u32) {
        self.state().faults.pharmacies = n;
    }

    /// Always fail satellite reads of `kind` for `ykiho`.
    pub fn fail_satellite(&self, kind: SatelliteKind, ykiho: &str) {
        self.state()
            .faults
            .satellites
            .insert((kind, ykiho.to_string()));
    }

    /// Drop the connection without telling the caller.
    pub fn drop_connection(&self) {
        self.state().connected = false;
    }

    pub fn connect_calls(&self) -> u32 {
        self.state().connect_calls
    }

    /// Hospital ids of every page served, in order.
    pub fn served_pages(&self) -> Vec<Vec<String>> {
        self.state().served_pages.clone()
    }

    fn connected_state(&self, context: &str) -> Result<MutexGuard<'_, StoreState>> {
        let state = self.state();
        if !state.connected {
            return Err(AppError::network(context, "not connected"));
        }
        Ok(state)
    }
}

fn take_fault(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl FacilityStore for MemoryStore {
    async fn connect(&self) -> Result<()> {
        let mut state = self.state();
        state.connect_calls += 1;
        if take_fault(&mut state.faults.connects) {
            state.connected = false;
            return Err(AppError::network("connect", "connection refused"));
        }
        state.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn ping(&self) -> Result<()> {
        let mut state = self.connected_state("ping")?;
        if take_fault(&mut state.faults.pings) {
            return Err(AppError::network("ping", "no reply"));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state().connected = false;
        Ok(())
    }

    async fn count_hospitals(&self) -> Result<u64> {
        let state = self.connected_state("count")?;
        Ok(state.hospitals.len() as u64)
    }

    async fn hospitals_after(&self, after: Option<&str>, limit: usize) -> Result<Vec<Hospital>> {
        let mut state = self.connected_state("hospitals_after")?;
        if take_fault(&mut state.faults.pages_network) {
            return Err(AppError::network("hospitals_after", "socket closed"));
        }
        if take_fault(&mut state.faults.pages_other) {
            return Err(AppError::store("cursor killed by server"));
        }

        let page: Vec<Hospital> = match after {
            Some(key) => state
                .hospitals
                .range::<str, _>((
                    std::ops::Bound::Excluded(key),
                    std::ops::Bound::Unbounded,
                ))
                .take(limit)
                .map(|(_, h)| h.clone())
                .collect(),
            None => state.hospitals.values().take(limit).cloned().collect(),
        };

        if !page.is_empty() {
            state
                .served_pages
                .push(page.iter().map(|h| h.id.clone()).collect());
        }
        Ok(page)
    }

    async fn satellite(&self, kind: SatelliteKind, ykiho: &str) -> Result<Vec<Value>> {
        let state = self.connected_state("satellite")?;
        let key = (kind, ykiho.to_string());
        if state.faults.satellites.contains(&key) {
            return Err(AppError::network(
                format!("{kind} for {ykiho}"),
                "read timed out",
            ));
        }
        Ok(state.satellites.get(&key).cloned().unwrap_or_default())
    }

    async fn schedule(&self, ykiho: &str) -> Result<Option<RawSchedule>> {
        let state = self.connected_state("schedule")?;
        Ok(state.schedules.get(ykiho).cloned())
    }

    async fn pharmacies_with_position(&self) -> Result<Vec<Pharmacy>> {
        let mut state = self.connected_state("pharmacies")?;
        if take_fault(&mut state.faults.pharmacies) {
            return Err(AppError::network("pharmacies", "cursor not found"));
        }
        Ok(state
            .pharmacies
            .iter()
            .filter(|p| p.position().is_some())
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
struct IndexState {
    documents: BTreeMap<String, HospitalDocument>,
    rejections: HashMap<String, String>,
    transport_failures: u32,
    bulk_calls: u32,
    refreshes: u32,
}

/// Search index held in memory.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    state: Mutex<IndexState>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject every write for `id` with `reason`.
    pub fn reject(&self, id: &str, reason: &str) {
        self.state()
            .rejections
            .insert(id.to_string(), reason.to_string());
    }

    /// Fail the next `n` bulk requests before any item is applied.
    pub fn fail_next_bulks(&self, n: u32) {
        self.state().transport_failures = n;
    }

    pub fn len(&self) -> usize {
        self.state().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().documents.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<HospitalDocument> {
        self.state().documents.get(id).cloned()
    }

    /// Snapshot of every stored document, ordered by id.
    pub fn documents(&self) -> Vec<HospitalDocument> {
        self.state().documents.values().cloned().collect()
    }

    pub fn bulk_calls(&self) -> u32 {
        self.state().bulk_calls
    }

    pub fn refresh_count(&self) -> u32 {
        self.state().refreshes
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn bulk(&self, actions: &[BulkAction], refresh: Refresh) -> Result<BulkResponse> {
        let mut state = self.state();
        state.bulk_calls += 1;
        if take_fault(&mut state.transport_failures) {
            return Err(AppError::network("_bulk", "connection reset by peer"));
        }

        let mut items = Vec::with_capacity(actions.len());
        for action in actions {
            match action {
                BulkAction::Upsert { id, document } => {
                    let error = state.rejections.get(id).cloned();
                    if error.is_none() {
                        state.documents.insert(id.clone(), (**document).clone());
                    }
                    items.push(BulkItemOutcome {
                        id: id.clone(),
                        error,
                    });
                }
            }
        }
        if refresh == Refresh::Immediate {
            state.refreshes += 1;
        }
        Ok(BulkResponse { items })
    }

    async fn refresh(&self) -> Result<()> {
        self.state().refreshes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hospital(id: &str) -> Hospital {
        Hospital {
            id: id.into(),
            ykiho: Some(format!("y-{id}")),
            ..Hospital::default()
        }
    }

    #[tokio::test]
    async fn test_reads_require_connection() {
        let store = MemoryStore::new();
        store.insert_hospital(hospital("a"));

        let err = store.hospitals_after(None, 10).await.unwrap_err();
        assert!(err.is_network());

        store.connect().await.unwrap();
        assert_eq!(store.hospitals_after(None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_range_is_exclusive() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c", "d"] {
            store.insert_hospital(hospital(id));
        }
        store.connect().await.unwrap();

        let page = store.hospitals_after(Some("b"), 10).await.unwrap();
        let ids: Vec<_> = page.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_connect_faults_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_connects(2);

        assert!(store.connect().await.is_err());
        assert!(store.connect().await.is_err());
        assert!(store.connect().await.is_ok());
        assert_eq!(store.connect_calls(), 3);
    }
}
