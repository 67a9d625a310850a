//! Manager configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the connection manager.
///
/// Durations are carried as milliseconds so the config round-trips cleanly
/// through JSON and environment layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum number of retries after the first failed attempt
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries
    pub base_retry_delay_ms: u64,

    /// Period of the keepalive task
    pub keep_alive_interval_ms: u64,

    /// Idle time after which a keepalive tick issues a probe
    pub inactivity_threshold_ms: u64,

    /// Time budget for a single query attempt or probe
    pub query_timeout_ms: u64,

    /// Time budget for acquiring a fresh handle
    pub connect_timeout_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 1_000,
            keep_alive_interval_ms: 300_000, // 5 minutes
            inactivity_threshold_ms: 240_000, // 4 minutes
            query_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.base_retry_delay_ms = delay_ms;
        self
    }

    pub fn with_keep_alive_interval_ms(mut self, interval_ms: u64) -> Self {
        self.keep_alive_interval_ms = interval_ms;
        self
    }

    pub fn with_inactivity_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.inactivity_threshold_ms = threshold_ms;
        self
    }

    pub fn with_query_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.query_timeout_ms = timeout_ms;
        self
    }

    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn inactivity_threshold(&self) -> Duration {
        Duration::from_millis(self.inactivity_threshold_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Backoff before retry number `attempt` (0-indexed).
    ///
    /// The shift is capped so a pathological attempt count cannot overflow.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.base_retry_delay_ms.saturating_mul(factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_retry_delay_ms, 1_000);
        assert_eq!(config.keep_alive_interval_ms, 300_000);
        assert_eq!(config.inactivity_threshold_ms, 240_000);
        assert_eq!(config.query_timeout_ms, 30_000);
        assert_eq!(config.connect_timeout_ms, 10_000);
    }

    #[test]
    fn test_builder_methods() {
        let config = ManagerConfig::new()
            .with_max_retries(5)
            .with_base_retry_delay_ms(250)
            .with_keep_alive_interval_ms(60_000)
            .with_inactivity_threshold_ms(45_000)
            .with_query_timeout_ms(5_000)
            .with_connect_timeout_ms(2_000);

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_retry_delay(), Duration::from_millis(250));
        assert_eq!(config.keep_alive_interval(), Duration::from_secs(60));
        assert_eq!(config.inactivity_threshold(), Duration::from_secs(45));
        assert_eq!(config.query_timeout(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_retry_delay_doubles() {
        let config = ManagerConfig::default();
        assert_eq!(config.retry_delay(0), Duration::from_millis(1_000));
        assert_eq!(config.retry_delay(1), Duration::from_millis(2_000));
        assert_eq!(config.retry_delay(2), Duration::from_millis(4_000));
    }

    #[test]
    fn test_retry_delay_never_overflows() {
        let config = ManagerConfig::default().with_base_retry_delay_ms(u64::MAX / 2);
        let delay = config.retry_delay(u32::MAX);
        assert_eq!(delay, Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = ManagerConfig::default().with_max_retries(7);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ManagerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
