//! Periodic background tasks: metrics summary and push retry

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};

use crate::service::health::HealthMonitor;
use crate::storage::error::StoreErrorKind;
use crate::storage::store::DurableStore;

/// Log a metrics summary when any background writes happened.
///
/// Returns true if a summary was emitted.
pub fn log_metrics_summary(health: &HealthMonitor) -> bool {
    let metrics = health.metrics();
    if metrics.operations_total == 0 {
        return false;
    }

    info!(
        operations_total = metrics.operations_total,
        operations_succeeded = metrics.operations_succeeded,
        operations_failed = metrics.operations_failed,
        retries_total = metrics.retries_total,
        success_rate = format!("{:.1}%", metrics.success_rate()),
        avg_latency_ms = format!("{:.1}", metrics.avg_latency_ms),
        last_operation = ?metrics.last_operation,
        "Durable write metrics"
    );
    true
}

/// Push locally committed writes if an earlier write left them behind.
///
/// Returns true if a push was attempted and succeeded.
pub async fn retry_pending_push(
    durable: &dyn DurableStore,
    health: &HealthMonitor,
    limit: Duration,
) -> bool {
    if !health.push_needed() {
        return false;
    }

    info!("Retrying push of pending durable writes");
    let result = match timeout(limit, durable.push_pending_writes()).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Push retry timed out after {:?}", limit);
            health.record_failure(Utc::now());
            return false;
        }
    };

    match result {
        Ok(()) => {
            health.set_push_needed(false);
            health.record_success(Utc::now());
            info!("Pending durable writes pushed");
            true
        }
        Err(e) if e.kind == StoreErrorKind::Unsupported => {
            debug!("{}", e);
            health.record_failure(Utc::now());
            false
        }
        Err(e) => {
            warn!("Push retry failed: {}", e);
            health.record_failure(Utc::now());
            false
        }
    }
}

/// Handles of the running maintenance tasks
pub struct MaintenanceHandle {
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Signal both tasks to stop and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Spawn the metrics summary task and the push retry task.
pub fn spawn_maintenance(
    durable: Arc<dyn DurableStore>,
    health: Arc<HealthMonitor>,
    every: Duration,
    push_timeout: Duration,
) -> MaintenanceHandle {
    let (stop, stop_rx) = watch::channel(false);

    let metrics_task = {
        let health = Arc::clone(&health);
        let stop_rx = stop_rx.clone();
        tokio::spawn(run_periodic("metrics summary", every, stop_rx, move || {
            let health = Arc::clone(&health);
            async move {
                log_metrics_summary(&health);
            }
        }))
    };

    let push_task = tokio::spawn(run_periodic("push retry", every, stop_rx, move || {
        let durable = Arc::clone(&durable);
        let health = Arc::clone(&health);
        async move {
            retry_pending_push(durable.as_ref(), &health, push_timeout).await;
        }
    }));

    MaintenanceHandle {
        stop,
        tasks: vec![metrics_task, push_task],
    }
}

async fn run_periodic<F, Fut>(
    name: &'static str,
    every: Duration,
    mut stop: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    debug!("Started {} task every {:?}", name, every);
    loop {
        tokio::select! {
            _ = ticker.tick() => tick().await,
            _ = stop.changed() => break,
        }
    }
    debug!("Stopped {} task", name);
}
