// src/pipeline/progress.rs

//! Throughput tracking, pacing and progress reporting.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::projector::BatchResult;

/// Running totals plus a moving window of recent batch timings.
///
/// Throughput and ETA are derived from the window, not from the whole run,
/// so they follow the current batch speed and ignore pacing and backoff.
#[derive(Debug, Clone)]
pub struct ProgressMetrics {
    /// `(documents, elapsed)` of the most recent successful batches
    window: VecDeque<(usize, Duration)>,
    capacity: usize,
    started: Instant,
    total: Option<u64>,
    processed: u64,
    rejected: u64,
    batches: u64,
    failed_batches: u64,
    pages: u64,
}

impl ProgressMetrics {
    pub fn new(window: usize) -> Self {
        let capacity = window.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            started: Instant::now(),
            total: None,
            processed: 0,
            rejected: 0,
            batches: 0,
            failed_batches: 0,
            pages: 0,
        }
    }

    pub fn set_total(&mut self, total: u64) {
        self.total = Some(total);
    }

    /// Fold in the results of one page.
    pub fn record_page(&mut self, results: &[BatchResult]) {
        self.pages += 1;
        for result in results {
            self.record(result);
        }
    }

    /// Fold in one batch. Failed batches carry no timing.
    pub fn record(&mut self, result: &BatchResult) {
        self.batches += 1;
        if result.count == 0 {
            self.failed_batches += 1;
            return;
        }
        self.processed += result.count as u64;
        self.rejected += result.rejected as u64;
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back((result.count, result.elapsed));
    }

    /// Mean of the recent batch timings, zero before the first batch.
    pub fn average(&self) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.window.iter().map(|(_, elapsed)| *elapsed).sum();
        sum / self.window.len() as u32
    }

    /// Mean documents per batch over the window.
    fn average_batch_len(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let docs: usize = self.window.iter().map(|(count, _)| count).sum();
        docs as f64 / self.window.len() as f64
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Documents per second of one batch over the window.
    pub fn throughput(&self) -> f64 {
        let secs = self.average().as_secs_f64();
        if secs > 0.0 {
            self.average_batch_len() / secs
        } else {
            0.0
        }
    }

    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => {
                Some((self.processed as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }

    /// Remaining batches times the moving average batch time.
    pub fn eta(&self) -> Option<Duration> {
        let total = self.total?;
        let per_batch = self.average_batch_len();
        if per_batch <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.processed) as f64;
        let batches = (remaining / per_batch).ceil();
        Some(self.average().mul_f64(batches))
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn pages(&self) -> u64 {
        self.pages
    }

    pub fn summary(
        &self,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        interrupted: bool,
    ) -> RunSummary {
        RunSummary {
            started_at,
            finished_at,
            elapsed: self.elapsed(),
            total: self.total,
            processed: self.processed,
            rejected: self.rejected,
            batches: self.batches,
            failed_batches: self.failed_batches,
            pages: self.pages,
            interrupted,
        }
    }
}

/// Delay before the next page: `average × factor`, clamped to `[floor, ceiling]`.
pub fn pacing_delay(average: Duration, factor: f64, floor: Duration, ceiling: Duration) -> Duration {
    let ceiling = ceiling.max(floor);
    let secs = average.as_secs_f64() * factor;
    if !secs.is_finite() || secs <= floor.as_secs_f64() {
        return floor;
    }
    if secs >= ceiling.as_secs_f64() {
        return ceiling;
    }
    Duration::from_secs_f64(secs)
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub total: Option<u64>,
    pub processed: u64,
    pub rejected: u64,
    pub batches: u64,
    pub failed_batches: u64,
    pub pages: u64,
    /// Stopped by a shutdown request before the store was exhausted
    pub interrupted: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents ({} rejected) in {} batches over {} pages, {:.1}s",
            self.processed,
            self.rejected,
            self.batches,
            self.pages,
            self.elapsed.as_secs_f64()
        )?;
        if self.failed_batches > 0 {
            write!(f, ", {} batches failed", self.failed_batches)?;
        }
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

/// Receives progress after every page and the final summary.
pub trait ProgressSink: Send + Sync {
    fn report(&self, metrics: &ProgressMetrics);

    fn finish(&self, summary: &RunSummary);
}

/// Writes progress through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn report(&self, metrics: &ProgressMetrics) {
        let position = match (metrics.total(), metrics.percent()) {
            (Some(total), Some(percent)) => {
                format!("{}/{} ({:.1}%)", metrics.processed(), total, percent)
            }
            _ => metrics.processed().to_string(),
        };
        let eta = metrics
            .eta()
            .map(|eta| format!("{}s", eta.as_secs()))
            .unwrap_or_else(|| "-".to_string());
        log::info!(
            "Progress: {} | {:.1} docs/s | avg batch {:.2}s | ETA {}",
            position,
            metrics.throughput(),
            metrics.average().as_secs_f64(),
            eta
        );
    }

    fn finish(&self, summary: &RunSummary) {
        log::info!(
            "Run {} → {}: {}",
            summary.started_at.format("%Y-%m-%d %H:%M:%S"),
            summary.finished_at.format("%H:%M:%S"),
            summary
        );
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _metrics: &ProgressMetrics) {}

    fn finish(&self, _summary: &RunSummary) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(count: usize, millis: u64) -> BatchResult {
        BatchResult {
            batch_no: 1,
            count,
            rejected: 0,
            elapsed: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_pacing_clamped_to_bounds() {
        let floor = Duration::from_secs(1);
        let ceiling = Duration::from_secs(5);

        assert_eq!(pacing_delay(Duration::ZERO, 1.0, floor, ceiling), floor);
        assert_eq!(
            pacing_delay(Duration::from_secs(3), 1.0, floor, ceiling),
            Duration::from_secs(3)
        );
        assert_eq!(
            pacing_delay(Duration::from_secs(86_400 * 365), 1.0, floor, ceiling),
            ceiling
        );
        assert_eq!(
            pacing_delay(Duration::from_secs(2), f64::NAN, floor, ceiling),
            floor
        );
        assert_eq!(
            pacing_delay(Duration::from_secs(2), f64::INFINITY, floor, ceiling),
            floor
        );
    }

    #[test]
    fn test_moving_average_window() {
        let mut metrics = ProgressMetrics::new(2);
        metrics.record(&batch(10, 1000));
        metrics.record(&batch(10, 2000));
        metrics.record(&batch(10, 4000));

        assert_eq!(metrics.average(), Duration::from_millis(3000));
        assert_eq!(metrics.processed(), 30);
    }

    #[test]
    fn test_failed_batches_carry_no_timing() {
        let mut metrics = ProgressMetrics::new(5);
        metrics.record(&batch(10, 2000));
        metrics.record(&BatchResult::failed(2));

        assert_eq!(metrics.average(), Duration::from_secs(2));
        assert_eq!(metrics.batches(), 2);
        assert_eq!(metrics.processed(), 10);
    }

    #[test]
    fn test_percent_requires_total() {
        let mut metrics = ProgressMetrics::new(5);
        metrics.record(&batch(25, 100));
        assert_eq!(metrics.percent(), None);

        metrics.set_total(100);
        assert_eq!(metrics.percent(), Some(25.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eta_follows_moving_average() {
        let mut metrics = ProgressMetrics::new(2);
        metrics.set_total(1_000);
        assert_eq!(metrics.eta(), None);

        metrics.record(&batch(100, 4000));
        // Idle time between batches does not count
        tokio::time::advance(Duration::from_secs(600)).await;
        metrics.record(&batch(100, 2000));

        // 800 remaining = 8 batches at 3s
        assert_eq!(metrics.eta(), Some(Duration::from_secs(24)));
        assert!((metrics.throughput() - 100.0 / 3.0).abs() < 1e-9);

        // The oldest timing leaves the window
        metrics.record(&batch(100, 2000));
        assert_eq!(metrics.eta(), Some(Duration::from_secs(14)));
        assert!((metrics.throughput() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_display() {
        let mut metrics = ProgressMetrics::new(5);
        metrics.record_page(&[batch(4, 10), BatchResult::failed(2)]);
        let now = Utc::now();
        let text = metrics.summary(now, now, true).to_string();

        assert!(text.starts_with("4 documents (0 rejected) in 2 batches over 1 pages"));
        assert!(text.contains("1 batches failed"));
        assert!(text.ends_with("(interrupted)"));
    }
}
