//! Service layer for the indexer.
//!
//! This module contains the per-record business logic:
//! - Opening-hours normalization (`schedule`)
//! - Nearby pharmacy lookup (`NearbyIndex`)
//! - Satellite joining and document assembly (`RecordEnricher`)

pub mod enricher;
pub mod nearby;
pub mod schedule;

pub use enricher::RecordEnricher;
pub use nearby::NearbyIndex;
