// src/pipeline/scheduler.rs

//! Runs the batches of one page concurrently.

use futures::future::join_all;

use crate::models::Hospital;
use crate::services::NearbyIndex;

use super::projector::{BatchProjector, BatchResult};

pub struct ParallelBatchScheduler {
    projector: BatchProjector,
    batch_size: usize,
    parallelism: usize,
    last_batch_no: u64,
}

impl ParallelBatchScheduler {
    pub fn new(projector: BatchProjector, batch_size: usize, parallelism: usize) -> Self {
        Self {
            projector,
            batch_size: batch_size.max(1),
            parallelism: parallelism.max(1),
            last_batch_no: 0,
        }
    }

    /// Number of batches dispatched so far.
    pub fn batches_dispatched(&self) -> u64 {
        self.last_batch_no
    }

    /// Split `page` into batches and run up to `parallelism` of them at once.
    ///
    /// Returns once every batch has settled, in batch order.
    pub async fn run_page(&mut self, page: &[Hospital], nearby: &NearbyIndex) -> Vec<BatchResult> {
        let batches: Vec<(u64, &[Hospital])> = page
            .chunks(self.batch_size)
            .map(|chunk| {
                self.last_batch_no += 1;
                (self.last_batch_no, chunk)
            })
            .collect();

        let mut results = Vec::with_capacity(batches.len());
        for wave in batches.chunks(self.parallelism) {
            let projector = &self.projector;
            let settled = join_all(
                wave.iter()
                    .map(|(batch_no, chunk)| projector.project(*batch_no, chunk, nearby)),
            )
            .await;
            results.extend(settled);
        }
        results
    }
}
