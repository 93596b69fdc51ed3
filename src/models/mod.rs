// src/models/mod.rs

//! Domain models for the indexer.
//!
//! Upstream records, the normalized schedule, the denormalized index
//! document and the application configuration.

mod config;
mod document;
mod hospital;
pub(crate) mod lenient;
mod schedule;

// Re-export all public types
pub use config::{
    BackoffKind, Config, IndexConfig, LoggingConfig, PipelineConfig, RetryConfig, StoreBackend,
    StoreConfig,
};
pub use document::{CareFlags, GeoPoint, HospitalDocument, MISSING, NearbyPharmacy};
pub use hospital::{
    EquipmentRow, FoodTreatmentRow, Hospital, NursingGradeRow, PersonnelRow, Pharmacy,
    SatelliteKind, Satellites, SubjectRow, TypeRow,
};
pub use schedule::{DaySchedule, RawSchedule, Schedule, TimeWindow};
