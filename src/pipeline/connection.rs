// src/pipeline/connection.rs

//! Primary store connection supervision.
//!
//! One supervisor owns the shared store handle for the whole run. Every
//! transition takes `&mut self`, so reconnects are serialised by the driver.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::StoreConfig;
use crate::storage::{FacilityStore, with_timeout};

use super::retry::RetryPolicy;
use super::shutdown::Shutdown;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// No success within the staleness window; liveness unknown
    Stale,
    NetworkError,
}

pub struct ConnectionSupervisor {
    store: Arc<dyn FacilityStore>,
    policy: RetryPolicy,
    connect_timeout: Duration,
    call_timeout: Duration,
    stale_after: Duration,
    state: ConnectionState,
    last_success: Option<Instant>,
    shutdown: Shutdown,
}

impl ConnectionSupervisor {
    pub fn new(
        store: Arc<dyn FacilityStore>,
        policy: RetryPolicy,
        config: &StoreConfig,
        stale_after: Duration,
    ) -> Self {
        Self {
            store,
            policy,
            connect_timeout: config.connect_timeout(),
            call_timeout: config.call_timeout(),
            stale_after,
            state: ConnectionState::Disconnected,
            last_success: None,
            shutdown: Shutdown::new(),
        }
    }

    /// Stop retrying connects once `shutdown` is requested.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn store(&self) -> &Arc<dyn FacilityStore> {
        &self.store
    }

    /// Connect unless already connected.
    ///
    /// Fails with [`AppError::ConnectionExhausted`], or with
    /// [`AppError::Interrupted`] when a shutdown arrives between attempts.
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected && self.store.is_connected() {
            return Ok(());
        }
        self.connect_with_retry().await
    }

    /// Ping the store if nothing succeeded within the staleness window.
    ///
    /// A failed ping forces a reconnect.
    pub async fn check_staleness(&mut self) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Ok(());
        }
        let fresh = self
            .last_success
            .is_some_and(|at| at.elapsed() < self.stale_after);
        if fresh {
            return Ok(());
        }

        self.state = ConnectionState::Stale;
        log::debug!(
            "No store activity for {}s, checking connection",
            self.stale_after.as_secs()
        );
        match with_timeout(self.call_timeout, "ping", self.store.ping()).await {
            Ok(()) => {
                self.mark_success();
                Ok(())
            }
            Err(e) => {
                log::warn!("Store ping failed: {}", e);
                self.reconnect().await
            }
        }
    }

    pub fn mark_success(&mut self) {
        self.state = ConnectionState::Connected;
        self.last_success = Some(Instant::now());
    }

    pub fn mark_network_error(&mut self, error: &AppError) {
        log::warn!("Network error: {}", error);
        self.state = ConnectionState::NetworkError;
    }

    /// Drop the current connection and establish a new one.
    pub async fn reconnect(&mut self) -> Result<()> {
        log::info!("Reconnecting to store...");
        if let Err(e) = self.store.disconnect().await {
            log::debug!("Disconnect before reconnect failed: {}", e);
        }
        self.state = ConnectionState::Disconnected;
        self.connect_with_retry().await
    }

    /// Close the connection. Errors are logged, never returned.
    pub async fn release(&mut self) {
        if let Err(e) = self.store.disconnect().await {
            log::warn!("Failed to close store connection: {}", e);
        }
        self.state = ConnectionState::Disconnected;
        log::info!("Store connection released");
    }

    /// Run a store call under the call timeout.
    pub async fn call<T, F>(&self, context: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        with_timeout(self.call_timeout, context, call).await
    }

    async fn connect_with_retry(&mut self) -> Result<()> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if self.shutdown.is_requested() {
                self.state = ConnectionState::Disconnected;
                log::warn!("Shutdown requested, abandoning connect after {} attempts", attempt - 1);
                return Err(AppError::Interrupted);
            }
            self.state = ConnectionState::Connecting;
            match with_timeout(self.connect_timeout, "connect", self.store.connect()).await {
                Ok(()) => {
                    log::info!("Connected to store (attempt {}/{})", attempt, max_attempts);
                    self.mark_success();
                    return Ok(());
                }
                Err(e) => {
                    log::warn!(
                        "Store connection attempt {}/{} failed: {}",
                        attempt,
                        max_attempts,
                        e
                    );
                    last_error = e.to_string();
                    self.state = ConnectionState::NetworkError;
                    if attempt < max_attempts
                        && self.shutdown.sleep(self.policy.delay_for(attempt)).await
                    {
                        self.state = ConnectionState::Disconnected;
                        log::warn!("Shutdown requested during connect backoff");
                        return Err(AppError::Interrupted);
                    }
                }
            }
        }

        self.state = ConnectionState::Disconnected;
        log::error!("Giving up on store after {} attempts", max_attempts);
        Err(AppError::ConnectionExhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackoffKind;
    use crate::storage::MemoryStore;

    fn supervisor(store: Arc<MemoryStore>, max_attempts: u32) -> ConnectionSupervisor {
        let policy = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(15),
            backoff: BackoffKind::Linear,
        };
        ConnectionSupervisor::new(
            store,
            policy,
            &StoreConfig::default(),
            Duration::from_secs(300),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_with_linear_backoff() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_connects(2);
        let mut sup = supervisor(store.clone(), 10);

        let started = Instant::now();
        sup.ensure_connected().await.unwrap();

        assert_eq!(sup.state(), ConnectionState::Connected);
        assert_eq!(store.connect_calls(), 3);
        // 15s after the first failure, 30s after the second
        assert!(started.elapsed() >= Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_connects(100);
        let mut sup = supervisor(store.clone(), 3);

        let err = sup.ensure_connected().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, AppError::ConnectionExhausted { attempts: 3, .. }));
        assert_eq!(store.connect_calls(), 3);
        assert_eq!(sup.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_connect_backoff() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_connects(100);
        let shutdown = Shutdown::new();
        let mut sup = supervisor(store.clone(), 10).with_shutdown(shutdown.clone());

        let remote = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            remote.request();
        });

        let started = Instant::now();
        let err = sup.ensure_connected().await.unwrap_err();

        assert!(matches!(err, AppError::Interrupted));
        // Attempt 1, 15s wait, attempt 2, then the 30s wait is cut at 20s
        assert_eq!(store.connect_calls(), 2);
        assert!(started.elapsed() < Duration::from_secs(45));
        assert_eq!(sup.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_connect_after_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let shutdown = Shutdown::new();
        shutdown.request();
        let mut sup = supervisor(store.clone(), 10).with_shutdown(shutdown);

        let err = sup.ensure_connected().await.unwrap_err();
        assert!(matches!(err, AppError::Interrupted));
        assert_eq!(store.connect_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_handle_is_reused() {
        let store = Arc::new(MemoryStore::new());
        let mut sup = supervisor(store.clone(), 3);

        sup.ensure_connected().await.unwrap();
        sup.ensure_connected().await.unwrap();
        assert_eq!(store.connect_calls(), 1);

        store.drop_connection();
        sup.ensure_connected().await.unwrap();
        assert_eq!(store.connect_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_connection_failed_ping_reconnects() {
        let store = Arc::new(MemoryStore::new());
        let mut sup = supervisor(store.clone(), 3);
        sup.ensure_connected().await.unwrap();

        // Within the window nothing is checked
        store.fail_next_pings(1);
        sup.check_staleness().await.unwrap();
        assert_eq!(store.connect_calls(), 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        sup.check_staleness().await.unwrap();
        assert_eq!(store.connect_calls(), 2);
        assert_eq!(sup.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_connection_healthy_ping_keeps_handle() {
        let store = Arc::new(MemoryStore::new());
        let mut sup = supervisor(store.clone(), 3);
        sup.ensure_connected().await.unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        sup.check_staleness().await.unwrap();
        assert_eq!(store.connect_calls(), 1);
        assert_eq!(sup.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_disconnects() {
        let store = Arc::new(MemoryStore::new());
        let mut sup = supervisor(store.clone(), 3);
        sup.ensure_connected().await.unwrap();

        sup.release().await;
        assert!(!store.is_connected());
        assert_eq!(sup.state(), ConnectionState::Disconnected);
    }
}
