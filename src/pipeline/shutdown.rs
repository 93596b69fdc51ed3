// src/pipeline/shutdown.rs

//! Cooperative stop signal shared by the driver and the connection layer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Cloneable stop flag whose waits can be interrupted.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Ask every holder to stop at its next check or wait.
    pub fn request(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until a stop is requested.
    pub async fn requested(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|&stop| stop).await;
    }

    /// Sleep for `duration` unless a stop arrives first.
    ///
    /// Returns `true` when the sleep was cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.requested() => true,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_to_completion() {
        let shutdown = Shutdown::new();
        let started = Instant::now();

        assert!(!shutdown.sleep(Duration::from_secs(10)).await);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_cuts_sleep_short() {
        let shutdown = Shutdown::new();
        let remote = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            remote.request();
        });

        let started = Instant::now();
        assert!(shutdown.sleep(Duration::from_secs(3600)).await);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(shutdown.is_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_requested_does_not_sleep() {
        let shutdown = Shutdown::new();
        shutdown.request();

        let started = Instant::now();
        assert!(shutdown.sleep(Duration::from_secs(60)).await);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
