//! Manager Health Reporting
//!
//! Point-in-time health snapshots of the managed handle plus process-lifetime
//! query statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Point-in-time view of the manager's state.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Whether the handle is believed usable right now
    pub is_active: bool,
    /// Failures since the last success
    pub consecutive_errors: u32,
    /// Wall-clock time of the most recent successful operation, if any
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    /// Summarize the snapshot into a coarse status.
    pub fn status(&self) -> HealthStatus {
        if !self.is_active {
            HealthStatus::Unhealthy {
                reason: "no usable handle".to_string(),
            }
        } else if self.consecutive_errors > 0 {
            HealthStatus::Degraded {
                reason: format!("{} consecutive error(s)", self.consecutive_errors),
            }
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Health status enumeration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum HealthStatus {
    /// Handle is operating normally
    Healthy,
    /// Handle is usable but has seen recent failures
    Degraded { reason: String },
    /// Handle is not operational
    Unhealthy { reason: String },
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded { reason } => write!(f, "DEGRADED: {}", reason),
            HealthStatus::Unhealthy { reason } => write!(f, "UNHEALTHY: {}", reason),
        }
    }
}

/// Process-lifetime query statistics.
///
/// Observability only; never consulted by control flow.
#[derive(Debug, Clone)]
pub struct QueryStats {
    pub total_queries: u64,
    pub total_failures: u64,
    pub total_probes: u64,
    pub created_at: Instant,
}

impl QueryStats {
    /// Failure rate as a percentage of all queries.
    pub fn error_rate(&self) -> f64 {
        if self.total_queries > 0 {
            (self.total_failures as f64 / self.total_queries as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn success_rate(&self) -> f64 {
        100.0 - self.error_rate()
    }

    /// Time since the manager was created.
    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }
}
