//! Consecutive page failure breaker.
//!
//! Counts non-network page failures. Once the count reaches the threshold
//! the breaker trips: the driver cools down, forces a reconnect and resets.
//! A successful page resets the count.

use std::time::Duration;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker. Default: 3
    pub threshold: u32,
    /// Pause after tripping. Default: 30s
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Breaker over consecutive page failures.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    consecutive: u32,
}

/// Result of recording a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitBreakerResult {
    /// Below the threshold; retry right away
    Closed { consecutive: u32, threshold: u32 },
    /// Threshold reached; cool down for `cooldown`, reconnect, then reset
    Tripped { consecutive: u32, cooldown: Duration },
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a new circuit breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            consecutive: 0,
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Count one failure.
    pub fn record_failure(&mut self) -> CircuitBreakerResult {
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive >= self.config.threshold {
            log::error!(
                "Circuit breaker: TRIGGERED after {} consecutive errors, cooling down {}s",
                self.consecutive,
                self.config.cooldown.as_secs()
            );
            CircuitBreakerResult::Tripped {
                consecutive: self.consecutive,
                cooldown: self.config.cooldown,
            }
        } else {
            CircuitBreakerResult::Closed {
                consecutive: self.consecutive,
                threshold: self.config.threshold,
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.consecutive > 0 {
            log::debug!(
                "Circuit breaker: reset after {} errors",
                self.consecutive
            );
        }
        self.consecutive = 0;
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_stays_closed() {
        let mut cb = CircuitBreaker::new();

        assert_eq!(
            cb.record_failure(),
            CircuitBreakerResult::Closed {
                consecutive: 1,
                threshold: 3
            }
        );
        assert!(matches!(
            cb.record_failure(),
            CircuitBreakerResult::Closed { consecutive: 2, .. }
        ));
    }

    #[test]
    fn test_trips_at_threshold() {
        let mut cb = CircuitBreaker::new();
        cb.record_failure();
        cb.record_failure();

        assert_eq!(
            cb.record_failure(),
            CircuitBreakerResult::Tripped {
                consecutive: 3,
                cooldown: Duration::from_secs(30)
            }
        );
    }

    #[test]
    fn test_success_resets_count() {
        let mut cb = CircuitBreaker::new();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();

        assert_eq!(cb.consecutive(), 0);
        assert!(matches!(
            cb.record_failure(),
            CircuitBreakerResult::Closed { consecutive: 1, .. }
        ));
    }

    #[test]
    fn test_custom_threshold() {
        let mut cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            threshold: 1,
            cooldown: Duration::from_secs(5),
        });

        assert!(matches!(
            cb.record_failure(),
            CircuitBreakerResult::Tripped { .. }
        ));
        cb.reset();
        assert_eq!(cb.consecutive(), 0);
    }
}
