// src/pipeline/retry.rs

//! Retry policy shared by the connection layer and the page loop.

use std::time::Duration;

use crate::error::AppError;
use crate::models::{BackoffKind, RetryConfig};

/// How the driver should react to a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Reconnect and retry the same work without counting it
    Network,
    /// Stop the run
    Fatal,
    /// Stop the run cleanly; a shutdown was requested
    Shutdown,
    /// Count toward the consecutive error threshold and retry
    Other,
}

/// Attempt limit, backoff function and error classifier.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: BackoffKind,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_secs(config.base_delay_secs),
            backoff: config.backoff,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            BackoffKind::Linear => self.base_delay.saturating_mul(attempt),
            BackoffKind::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        }
    }

    pub fn classify(&self, error: &AppError) -> ErrorClass {
        if error.is_interrupted() {
            ErrorClass::Shutdown
        } else if error.is_fatal() {
            ErrorClass::Fatal
        } else if error.is_network() {
            ErrorClass::Network
        } else {
            ErrorClass::Other
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(15));
        assert_eq!(policy.delay_for(2), Duration::from_secs(30));
        assert_eq!(policy.delay_for(10), Duration::from_secs(150));
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            backoff: BackoffKind::Exponential,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        // Saturates instead of overflowing
        assert_eq!(policy.delay_for(64), Duration::from_secs(2).saturating_mul(u32::MAX));
    }

    #[test]
    fn test_classify() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.classify(&AppError::network("find", "reset")),
            ErrorClass::Network
        );
        assert_eq!(
            policy.classify(&AppError::ConnectionExhausted {
                attempts: 10,
                last_error: "refused".into(),
            }),
            ErrorClass::Fatal
        );
        assert_eq!(policy.classify(&AppError::Interrupted), ErrorClass::Shutdown);
        assert_eq!(
            policy.classify(&AppError::store("cursor killed")),
            ErrorClass::Other
        );
    }
}
