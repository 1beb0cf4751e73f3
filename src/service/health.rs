//! Durable-tier health tracking and write metrics
//!
//! [`HealthMonitor`] owns the mutable state behind a lock; the verdict itself
//! is computed by [`evaluate`], which only looks at a snapshot and a clock
//! reading.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::storage::error::StoreError;

/// Consecutive failures at which the degraded reason includes the timestamp
const DETAILED_FAILURE_THRESHOLD: u32 = 3;

/// Weight given to the newest latency sample
const LATENCY_EMA_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthState {
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    /// Failures since the last success
    pub recent_failures: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub operations_total: u64,
    pub operations_succeeded: u64,
    pub operations_failed: u64,
    pub retries_total: u64,
    pub avg_latency_ms: f64,
    pub last_operation: Option<DateTime<Utc>>,
}

impl Metrics {
    /// Percentage of finished operations that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.operations_total == 0 {
            return 0.0;
        }
        self.operations_succeeded as f64 / self.operations_total as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Health verdict for the durable tier.
///
/// `durable` is the result of the backend's own health probe; a failing probe
/// wins over anything recorded in `state`.
pub fn evaluate(
    state: &HealthState,
    now: DateTime<Utc>,
    window: Duration,
    durable: Result<(), &StoreError>,
) -> HealthStatus {
    if let Err(e) = durable {
        return HealthStatus::Unhealthy(e.to_string());
    }

    // timestamps ahead of `now` count as inside the window
    let within_window = |at: DateTime<Utc>| {
        now.signed_duration_since(at)
            .to_std()
            .map_or(true, |elapsed| elapsed < window)
    };

    if state.recent_failures > 0
        && let Some(last_failure) = state.last_failure
        && within_window(last_failure)
    {
        let reason = if state.recent_failures >= DETAILED_FAILURE_THRESHOLD {
            format!(
                "{} recent failures, last at {}",
                state.recent_failures,
                last_failure.to_rfc3339_opts(SecondsFormat::Secs, true)
            )
        } else {
            format!("{} recent failures", state.recent_failures)
        };
        return HealthStatus::Degraded(reason);
    }

    if let Some(last_success) = state.last_success
        && !within_window(last_success)
    {
        return HealthStatus::Degraded("no successful operations in window".to_string());
    }

    HealthStatus::Healthy
}

#[derive(Debug, Default)]
struct Inner {
    state: HealthState,
    metrics: Metrics,
}

/// Shared health and metrics state for background durable work
#[derive(Debug, Default)]
pub struct HealthMonitor {
    inner: RwLock<Inner>,
    push_needed: AtomicBool,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn write<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn read<R>(&self, f: impl FnOnce(&Inner) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn record_success(&self, now: DateTime<Utc>) {
        self.write(|inner| {
            inner.state.last_success = Some(now);
            inner.state.recent_failures = 0;
        });
    }

    pub fn record_failure(&self, now: DateTime<Utc>) {
        self.write(|inner| {
            inner.state.last_failure = Some(now);
            inner.state.recent_failures = inner.state.recent_failures.saturating_add(1);
        });
    }

    pub fn record_retry(&self) {
        self.write(|inner| inner.metrics.retries_total += 1);
    }

    /// Count one finished background write
    pub fn record_operation(&self, succeeded: bool, latency: Duration, now: DateTime<Utc>) {
        self.write(|inner| {
            let metrics = &mut inner.metrics;
            let sample = latency.as_secs_f64() * 1000.0;

            metrics.avg_latency_ms = if metrics.operations_total == 0 {
                sample
            } else {
                LATENCY_EMA_WEIGHT * sample + (1.0 - LATENCY_EMA_WEIGHT) * metrics.avg_latency_ms
            };
            metrics.operations_total += 1;
            if succeeded {
                metrics.operations_succeeded += 1;
            } else {
                metrics.operations_failed += 1;
            }
            metrics.last_operation = Some(now);
        });
    }

    pub fn set_push_needed(&self, needed: bool) {
        self.push_needed.store(needed, Ordering::SeqCst);
    }

    pub fn push_needed(&self) -> bool {
        self.push_needed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> HealthState {
        self.read(|inner| inner.state.clone())
    }

    pub fn metrics(&self) -> Metrics {
        self.read(|inner| inner.metrics.clone())
    }

    pub fn status(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        durable: Result<(), &StoreError>,
    ) -> HealthStatus {
        evaluate(&self.state(), now, window, durable)
    }
}
