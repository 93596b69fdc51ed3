// src/pipeline/projector.rs

//! Batch projection into the search index.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;

use crate::models::Hospital;
use crate::services::{NearbyIndex, RecordEnricher};
use crate::storage::{BulkAction, Refresh, SearchIndex};

/// Outcome of one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchResult {
    pub batch_no: u64,
    /// Documents attempted; zero when the bulk request itself failed
    pub count: usize,
    /// Documents skipped or refused by the index
    pub rejected: usize,
    pub elapsed: Duration,
}

impl BatchResult {
    pub fn failed(batch_no: u64) -> Self {
        Self {
            batch_no,
            count: 0,
            rejected: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Enriches a batch of hospitals and writes it with one bulk request.
#[derive(Clone)]
pub struct BatchProjector {
    enricher: RecordEnricher,
    index: Arc<dyn SearchIndex>,
}

impl BatchProjector {
    pub fn new(enricher: RecordEnricher, index: Arc<dyn SearchIndex>) -> Self {
        Self { enricher, index }
    }

    /// Project one batch. Never fails; failures are reported in the result.
    pub async fn project(
        &self,
        batch_no: u64,
        hospitals: &[Hospital],
        nearby: &NearbyIndex,
    ) -> BatchResult {
        let started = Instant::now();

        let documents = join_all(hospitals.iter().map(|h| self.enricher.enrich(h, nearby))).await;

        let mut rejected = 0;
        let mut actions = Vec::with_capacity(hospitals.len());
        for (hospital, document) in hospitals.iter().zip(documents) {
            match document {
                Some(document) => actions.push(BulkAction::upsert(document)),
                None => {
                    rejected += 1;
                    log::error!(
                        "Batch {}: hospital {:?} has no identifier, skipped",
                        batch_no,
                        hospital.id
                    );
                }
            }
        }

        if !actions.is_empty() {
            let response = match self.index.bulk(&actions, Refresh::Deferred).await {
                Ok(response) => response,
                Err(e) => {
                    log::error!("Batch {}: bulk request failed: {}", batch_no, e);
                    return BatchResult::failed(batch_no);
                }
            };
            if response.has_errors() {
                for item in response.rejected() {
                    rejected += 1;
                    log::error!(
                        "Batch {}: document {} rejected: {}",
                        batch_no,
                        item.id,
                        item.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }

        let result = BatchResult {
            batch_no,
            count: hospitals.len(),
            rejected,
            elapsed: started.elapsed(),
        };
        log::debug!(
            "Batch {}: {} documents, {} rejected in {:.2}s",
            batch_no,
            result.count,
            result.rejected,
            result.elapsed.as_secs_f64()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::storage::{FacilityStore, MemoryIndex, MemoryStore};

    /// Keeps every error-level message so tests can count them.
    struct CaptureLogger {
        errors: Mutex<Vec<String>>,
    }

    impl log::Log for CaptureLogger {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Error
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.errors.lock().unwrap().push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    static CAPTURE: CaptureLogger = CaptureLogger {
        errors: Mutex::new(Vec::new()),
    };

    /// Error messages logged so far that start with `prefix`.
    fn captured_errors(prefix: &str) -> Vec<String> {
        CAPTURE
            .errors
            .lock()
            .unwrap()
            .iter()
            .filter(|message| message.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn hospitals(n: usize) -> Vec<Hospital> {
        (0..n)
            .map(|i| Hospital {
                id: format!("oid-{i:04}"),
                ykiho: Some(format!("Y{i:04}")),
                name: Some(format!("병원 {i}")),
                ..Hospital::default()
            })
            .collect()
    }

    async fn projector(index: Arc<MemoryIndex>) -> BatchProjector {
        let store = Arc::new(MemoryStore::new());
        store.connect().await.unwrap();
        BatchProjector::new(RecordEnricher::new(store, Duration::from_secs(5)), index)
    }

    #[tokio::test]
    async fn test_resubmission_is_idempotent() {
        let index = Arc::new(MemoryIndex::new());
        let projector = projector(index.clone()).await;
        let batch = hospitals(10);
        let nearby = NearbyIndex::empty();

        projector.project(1, &batch, &nearby).await;
        let first = index.documents();
        projector.project(2, &batch, &nearby).await;

        assert_eq!(index.len(), 10);
        assert_eq!(index.documents(), first);
    }

    #[tokio::test]
    async fn test_rejected_documents_are_counted() {
        let index = Arc::new(MemoryIndex::new());
        index.reject("Y0007", "mapper_parsing_exception: failed to parse [location]");
        index.reject("Y0400", "version_conflict_engine_exception");
        let projector = projector(index.clone()).await;
        let _ = log::set_logger(&CAPTURE);
        log::set_max_level(log::LevelFilter::Error);

        // Batch number unique to this test; other tests log concurrently.
        let result = projector
            .project(9_003, &hospitals(500), &NearbyIndex::empty())
            .await;

        assert_eq!(result.batch_no, 9_003);
        assert_eq!(result.count, 500);
        assert_eq!(result.rejected, 2);
        assert_eq!(index.len(), 498);
        assert_eq!(index.bulk_calls(), 1);

        let errors = captured_errors("Batch 9003:");
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("Y0007") && e.contains("mapper_parsing_exception")));
        assert!(errors.iter().any(|e| e.contains("Y0400") && e.contains("version_conflict")));
    }

    #[tokio::test]
    async fn test_transport_failure_reports_zero() {
        let index = Arc::new(MemoryIndex::new());
        index.fail_next_bulks(1);
        let projector = projector(index.clone()).await;

        let result = projector
            .project(1, &hospitals(5), &NearbyIndex::empty())
            .await;

        assert_eq!(result, BatchResult::failed(1));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_missing_identifier_rejected_before_submit() {
        let index = Arc::new(MemoryIndex::new());
        let projector = projector(index.clone()).await;
        let mut batch = hospitals(3);
        batch[1] = Hospital::default();

        let result = projector.project(1, &batch, &NearbyIndex::empty()).await;

        assert_eq!(result.count, 3);
        assert_eq!(result.rejected, 1);
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let index = Arc::new(MemoryIndex::new());
        let projector = projector(index.clone()).await;

        let result = projector.project(1, &[], &NearbyIndex::empty()).await;

        assert_eq!(result.count, 0);
        assert_eq!(index.bulk_calls(), 0);
    }
}
