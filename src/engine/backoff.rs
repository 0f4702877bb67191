//! Reconnect policy for the engine connection.
//!
//! Exponential backoff from a 1s baseline doubling up to a 30s ceiling,
//! with a circuit breaker: after a configurable run of consecutive failures
//! the policy holds a longer cool-down delay instead of hammering the
//! endpoint, then keeps retrying. Connection loss is never fatal.

use std::time::Duration;

use serde::Deserialize;

/// Tunables for [`ReconnectPolicy`]. Defaults match the deployed baseline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// First retry delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Ceiling for the doubled delay in milliseconds.
    pub max_delay_ms: u64,
    /// Consecutive failures before the circuit breaker trips.
    pub max_consecutive_failures: u32,
    /// Delay applied while the breaker is open, in milliseconds.
    pub cool_down_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_consecutive_failures: 5,
            cool_down_ms: 60_000,
        }
    }
}

/// Per-channel reconnect state. One instance lives inside each channel
/// supervisor task; it is not shared.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    consecutive_failures: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
        }
    }

    /// Record a failed attempt and return how long to wait before the next.
    pub fn next_delay(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.breaker_open() {
            return Duration::from_millis(self.config.cool_down_ms);
        }
        let exponent = self.consecutive_failures.saturating_sub(1).min(31);
        let delay = self
            .config
            .initial_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.config.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Reset after the channel reaches its ready state.
    pub fn mark_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Number of failures since the last successful connection.
    pub fn attempt(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether the consecutive-failure run has tripped the breaker.
    pub fn breaker_open(&self) -> bool {
        self.consecutive_failures >= self.config.max_consecutive_failures
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig::default())
    }

    #[test]
    fn delays_double_up_to_ceiling() {
        let mut p = ReconnectPolicy::new(ReconnectConfig {
            max_consecutive_failures: 100,
            ..ReconnectConfig::default()
        });
        let delays: Vec<u64> = (0..7).map(|_| p.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn breaker_trips_after_consecutive_failures() {
        let mut p = policy();
        for _ in 0..4 {
            p.next_delay();
        }
        assert!(!p.breaker_open());
        let delay = p.next_delay();
        assert!(p.breaker_open());
        assert_eq!(delay, Duration::from_millis(60_000));
    }

    #[test]
    fn success_resets_run_and_breaker() {
        let mut p = policy();
        for _ in 0..6 {
            p.next_delay();
        }
        assert!(p.breaker_open());
        p.mark_success();
        assert!(!p.breaker_open());
        assert_eq!(p.attempt(), 0);
        assert_eq!(p.next_delay(), Duration::from_millis(1_000));
    }

    #[test]
    fn huge_failure_count_does_not_overflow() {
        let mut p = ReconnectPolicy::new(ReconnectConfig {
            max_consecutive_failures: u32::MAX,
            ..ReconnectConfig::default()
        });
        for _ in 0..80 {
            assert!(p.next_delay() <= Duration::from_millis(30_000));
        }
    }
}
