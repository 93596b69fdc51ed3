// src/services/enricher.rs

//! Per-hospital enrichment.
//!
//! Fetches every satellite collection and the raw schedule for one hospital
//! concurrently and assembles the index document. A failed satellite fetch
//! degrades to an empty collection; it never fails the document.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;

use crate::models::{Hospital, HospitalDocument, RawSchedule, SatelliteKind, Satellites};
use crate::services::nearby::NearbyIndex;
use crate::services::schedule;
use crate::storage::{FacilityStore, with_timeout};

/// Service that joins satellite data onto hospitals.
#[derive(Clone)]
pub struct RecordEnricher {
    store: Arc<dyn FacilityStore>,
    call_timeout: Duration,
}

impl RecordEnricher {
    pub fn new(store: Arc<dyn FacilityStore>, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }

    /// Build the index document for one hospital.
    ///
    /// Returns `None` only when the hospital has no usable identifier.
    pub async fn enrich(&self, hospital: &Hospital, nearby: &NearbyIndex) -> Option<HospitalDocument> {
        let (satellites, raw) =
            futures::join!(self.fetch_satellites(hospital), self.fetch_schedule(hospital));

        let schedule = schedule::normalize(raw.as_ref());
        let flags = schedule::care_flags(raw.as_ref(), &schedule);
        let nearby_pharmacies = nearby.nearby(hospital.position());

        HospitalDocument::assemble(hospital, satellites, schedule, flags, nearby_pharmacies)
    }

    async fn fetch_satellites(&self, hospital: &Hospital) -> Satellites {
        let mut satellites = Satellites::default();
        let Some(key) = hospital.satellite_key() else {
            return satellites;
        };

        let fetches = SatelliteKind::ALL
            .into_iter()
            .map(|kind| async move { (kind, self.fetch_kind(kind, key).await) });
        for (kind, rows) in join_all(fetches).await {
            satellites.set(kind, rows);
        }
        satellites
    }

    async fn fetch_kind(&self, kind: SatelliteKind, key: &str) -> Vec<Value> {
        let context = format!("{kind} for {key}");
        match with_timeout(self.call_timeout, &context, self.store.satellite(kind, key)).await {
            Ok(rows) => rows,
            Err(error) => {
                log::warn!("Failed to fetch {}: {}", context, error);
                Vec::new()
            }
        }
    }

    async fn fetch_schedule(&self, hospital: &Hospital) -> Option<RawSchedule> {
        let key = hospital.satellite_key()?;
        let context = format!("hospitaltimes for {key}");
        match with_timeout(self.call_timeout, &context, self.store.schedule(key)).await {
            Ok(raw) => raw,
            Err(error) => {
                log::warn!("Failed to fetch {}: {}", context, error);
                None
            }
        }
    }
}
