// src/pipeline/driver.rs

//! Top-level reindex loop.
//!
//! Pages through the primary store by ascending `_id`, fans each page out to
//! the batch scheduler and advances the cursor only after every batch of the
//! page has settled. Network errors retry the same page after reconnecting;
//! other errors are counted by a breaker that cools down at its threshold.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{Config, PipelineConfig};
use crate::services::{NearbyIndex, RecordEnricher};
use crate::storage::{FacilityStore, SearchIndex};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerResult};
use super::connection::ConnectionSupervisor;
use super::progress::{LogProgressSink, ProgressMetrics, ProgressSink, RunSummary, pacing_delay};
use super::projector::BatchProjector;
use super::retry::{ErrorClass, RetryPolicy};
use super::scheduler::ParallelBatchScheduler;
use super::shutdown::Shutdown;

/// Driver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Starting,
    Paging,
    Indexing,
    ErrorBackoff,
    Draining,
    Done,
}

enum PageOutcome {
    Indexed,
    Exhausted,
}

pub struct PipelineDriver {
    supervisor: ConnectionSupervisor,
    scheduler: ParallelBatchScheduler,
    index: Arc<dyn SearchIndex>,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
    metrics: ProgressMetrics,
    sink: Box<dyn ProgressSink>,
    config: PipelineConfig,
    cursor: Option<String>,
    state: DriverState,
    shutdown: Shutdown,
}

impl PipelineDriver {
    pub fn new(store: Arc<dyn FacilityStore>, index: Arc<dyn SearchIndex>, config: &Config) -> Self {
        let policy = RetryPolicy::from_config(&config.retry);
        let shutdown = Shutdown::new();
        let supervisor = ConnectionSupervisor::new(
            store.clone(),
            policy.clone(),
            &config.store,
            config.pipeline.stale_after(),
        )
        .with_shutdown(shutdown.clone());
        let enricher = RecordEnricher::new(store, config.store.call_timeout());
        let projector = BatchProjector::new(enricher, index.clone());
        let scheduler = ParallelBatchScheduler::new(
            projector,
            config.pipeline.batch_size,
            config.pipeline.parallelism,
        );
        let breaker = CircuitBreaker::with_config(CircuitBreakerConfig {
            threshold: config.pipeline.error_threshold,
            cooldown: config.pipeline.cooldown(),
        });

        Self {
            supervisor,
            scheduler,
            index,
            policy,
            breaker,
            metrics: ProgressMetrics::new(config.pipeline.moving_average_window),
            sink: Box::new(LogProgressSink),
            config: config.pipeline.clone(),
            cursor: None,
            state: DriverState::Starting,
            shutdown,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.supervisor = self.supervisor.with_shutdown(shutdown.clone());
        self.shutdown = shutdown;
        self
    }

    /// Signal that stops the run after the current page and cuts short
    /// every backoff, cooldown and pacing wait.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Key of the last fully indexed hospital.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Run a full reindex.
    ///
    /// The index is refreshed and the store connection released on every
    /// path. Only connection exhaustion fails the run; a shutdown request
    /// ends it with an interrupted summary.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let started_at = Utc::now();
        log::info!(
            "Starting reindex (batch size {}, parallelism {})",
            self.config.batch_size,
            self.config.parallelism
        );

        let outcome = match self.run_pages().await {
            Err(e) if e.is_interrupted() => {
                log::warn!(
                    "Shutdown requested, stopping after {} documents",
                    self.metrics.processed()
                );
                Ok(())
            }
            other => other,
        };

        self.state = DriverState::Draining;
        if let Err(e) = self.index.refresh().await {
            log::warn!("Index refresh failed: {}", e);
        }
        self.supervisor.release().await;
        self.state = DriverState::Done;

        let interrupted = self.shutdown.is_requested();
        let summary = self.metrics.summary(started_at, Utc::now(), interrupted);
        match outcome {
            Ok(()) => {
                self.sink.finish(&summary);
                Ok(summary)
            }
            Err(e) => {
                log::error!("Reindex aborted: {} ({})", e, summary);
                Err(e)
            }
        }
    }

    async fn run_pages(&mut self) -> Result<()> {
        self.state = DriverState::Starting;
        self.supervisor.ensure_connected().await?;

        let store = self.supervisor.store().clone();
        match self.supervisor.call("count", store.count_hospitals()).await {
            Ok(total) => {
                log::info!("{} hospitals to index", total);
                self.metrics.set_total(total);
            }
            Err(e) => log::warn!("Could not count hospitals: {}", e),
        }

        loop {
            if self.shutdown.is_requested() {
                return Err(AppError::Interrupted);
            }

            self.state = DriverState::Paging;
            let error = match self.process_page().await {
                Ok(PageOutcome::Exhausted) => {
                    log::info!("No more hospitals after {:?}", self.cursor);
                    return Ok(());
                }
                Ok(PageOutcome::Indexed) => {
                    self.breaker.record_success();
                    let delay = pacing_delay(
                        self.metrics.average(),
                        self.config.pacing_factor,
                        self.config.pacing_floor(),
                        self.config.pacing_ceiling(),
                    );
                    log::debug!("Pacing {}ms before next page", delay.as_millis());
                    self.pause(delay).await?;
                    continue;
                }
                Err(e) => e,
            };

            self.handle_error(error).await?;
        }
    }

    async fn process_page(&mut self) -> Result<PageOutcome> {
        self.supervisor.check_staleness().await?;
        self.supervisor.ensure_connected().await?;

        let store = self.supervisor.store().clone();
        let page = self
            .supervisor
            .call(
                "hospitals_after",
                store.hospitals_after(self.cursor.as_deref(), self.config.page_size()),
            )
            .await?;
        let Some(last_key) = page.last().map(|h| h.id.clone()) else {
            return Ok(PageOutcome::Exhausted);
        };

        let pharmacies = self
            .supervisor
            .call("pharmacies", store.pharmacies_with_position())
            .await?;
        let nearby = Arc::new(NearbyIndex::new(
            pharmacies,
            self.config.nearby_radius_m,
            self.config.nearby_limit,
        ));
        log::debug!(
            "Page of {} hospitals after {:?}, {} pharmacies with coordinates",
            page.len(),
            self.cursor,
            nearby.len()
        );

        self.state = DriverState::Indexing;
        let results = self.scheduler.run_page(&page, &nearby).await;

        self.metrics.record_page(&results);
        self.cursor = Some(last_key);
        self.supervisor.mark_success();
        self.sink.report(&self.metrics);
        Ok(PageOutcome::Indexed)
    }

    async fn handle_error(&mut self, error: AppError) -> Result<()> {
        match self.policy.classify(&error) {
            ErrorClass::Fatal | ErrorClass::Shutdown => Err(error),
            ErrorClass::Network => {
                self.supervisor.mark_network_error(&error);
                self.supervisor.reconnect().await?;
                self.pause(self.config.pacing_floor()).await
            }
            ErrorClass::Other => {
                self.state = DriverState::ErrorBackoff;
                log::error!("Page after {:?} failed: {}", self.cursor, error);
                match self.breaker.record_failure() {
                    CircuitBreakerResult::Closed {
                        consecutive,
                        threshold,
                    } => {
                        log::warn!("Retrying page ({}/{} errors)", consecutive, threshold);
                        self.pause(self.config.pacing_floor()).await?;
                    }
                    CircuitBreakerResult::Tripped { cooldown, .. } => {
                        self.pause(cooldown).await?;
                        self.supervisor.reconnect().await?;
                        self.breaker.reset();
                    }
                }
                Ok(())
            }
        }
    }

    /// Wait `delay`, failing with [`AppError::Interrupted`] on shutdown.
    async fn pause(&self, delay: Duration) -> Result<()> {
        if self.shutdown.sleep(delay).await {
            return Err(AppError::Interrupted);
        }
        Ok(())
    }
}
