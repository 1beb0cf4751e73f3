//! Two-tier write path
//!
//! `save` writes the cache tier before returning and hands the durable write to
//! a fixed pool of worker tasks. Each identifier always maps to the same
//! worker, so its durable writes land in the order they were saved.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::PersistenceConfig;
use crate::service::error::ServiceError;
use crate::service::health::HealthMonitor;
use crate::storage::error::{StoreError, StoreErrorKind};
use crate::storage::store::{DurableStore, VersionStore};
use crate::version::record::VersionRecord;

/// Lowercased message fragments that mark an uncategorized error as final
const NON_RETRYABLE_PHRASES: &[&str] = &[
    "authentication failed",
    "permission denied",
    "access denied",
    "unauthorized",
    "forbidden",
    "invalid credentials",
];

const PUSH_FAILURE_PHRASES: &[&str] = &["push failed", "failed to push"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl From<&PersistenceConfig> for PipelineSettings {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            attempt_timeout: config.attempt_timeout(),
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PersistenceConfig::default())
    }
}

/// Result of one durable write attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Success,
    /// Committed locally, not synchronized upstream
    PushFailure(StoreError),
    NonRetryable(StoreError),
    Retryable(StoreError),
}

impl WriteOutcome {
    pub fn into_error(self) -> Option<ServiceError> {
        match self {
            WriteOutcome::Success => None,
            WriteOutcome::PushFailure(e) => Some(ServiceError::PushFailure(e)),
            WriteOutcome::NonRetryable(e) => Some(ServiceError::NonRetryableDurableError(e)),
            WriteOutcome::Retryable(e) => Some(ServiceError::RetryableDurableError(e)),
        }
    }
}

pub fn classify(result: Result<(), StoreError>) -> WriteOutcome {
    let err = match result {
        Ok(()) => return WriteOutcome::Success,
        Err(e) => e,
    };

    match err.kind {
        StoreErrorKind::PushFailed => WriteOutcome::PushFailure(err),
        StoreErrorKind::Unauthorized => WriteOutcome::NonRetryable(err),
        StoreErrorKind::Other => classify_message(err),
        _ => WriteOutcome::Retryable(err),
    }
}

fn classify_message(err: StoreError) -> WriteOutcome {
    let message = err.message.to_lowercase();
    let contains_any = |phrases: &[&str]| phrases.iter().any(|p| message.contains(p));

    if contains_any(NON_RETRYABLE_PHRASES) {
        WriteOutcome::NonRetryable(err)
    } else if contains_any(PUSH_FAILURE_PHRASES) {
        WriteOutcome::PushFailure(err)
    } else {
        WriteOutcome::Retryable(err)
    }
}

#[derive(Debug)]
struct DurableWrite {
    identifier: String,
    record: VersionRecord,
}

/// State shared by every worker
struct WorkerContext {
    durable: Arc<dyn DurableStore>,
    health: Arc<HealthMonitor>,
    settings: PipelineSettings,
}

pub struct PersistencePipeline {
    cache: Arc<dyn VersionStore>,
    senders: Mutex<Option<Vec<mpsc::Sender<DurableWrite>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PersistencePipeline {
    /// Start the worker pool. Must be called from within a tokio runtime.
    pub fn new(
        cache: Arc<dyn VersionStore>,
        durable: Arc<dyn DurableStore>,
        health: Arc<HealthMonitor>,
        settings: PipelineSettings,
    ) -> Self {
        let context = Arc::new(WorkerContext {
            durable,
            health,
            settings,
        });

        let (senders, workers): (Vec<_>, Vec<_>) = (0..context.settings.workers)
            .map(|shard| {
                let (tx, rx) = mpsc::channel(context.settings.queue_capacity);
                let handle = tokio::spawn(run_worker(shard, rx, Arc::clone(&context)));
                (tx, handle)
            })
            .unzip();

        Self {
            cache,
            senders: Mutex::new(Some(senders)),
            workers: Mutex::new(workers),
        }
    }

    /// Write `record` to the cache and queue it for the durable tier.
    ///
    /// Waits for queue capacity when the identifier's worker is backed up.
    pub async fn save(&self, record: &VersionRecord) -> Result<(), ServiceError> {
        let identifier = record.identifier();

        self.cache
            .set(&identifier, record)
            .await
            .map_err(ServiceError::CacheWriteFailed)?;

        let sender = {
            let senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
            senders
                .as_ref()
                .map(|senders| senders[shard_for(&identifier, senders.len())].clone())
        };
        let Some(sender) = sender else {
            warn!("Pipeline closed, durable write for {} dropped", identifier);
            return Err(ServiceError::PipelineClosed);
        };

        debug!("Queued durable write for {} ({})", identifier, record.current);
        sender
            .send(DurableWrite { identifier, record: record.clone() })
            .await
            .map_err(|_| ServiceError::PipelineClosed)
    }

    /// Stop accepting writes and wait until every queued write is processed.
    pub async fn shutdown(&self) {
        let senders = self
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(senders);

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for result in join_all(workers).await {
            let _ = result.inspect_err(|e| error!("Durable write worker panicked: {}", e));
        }
    }
}

fn shard_for(identifier: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    identifier.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

async fn run_worker(
    shard: usize,
    mut rx: mpsc::Receiver<DurableWrite>,
    context: Arc<WorkerContext>,
) {
    debug!("Durable write worker {} started", shard);
    while let Some(write) = rx.recv().await {
        persist(&context, write).await;
    }
    debug!("Durable write worker {} drained", shard);
}

async fn attempt_write(context: &WorkerContext, write: &DurableWrite) -> Result<(), StoreError> {
    let limit = context.settings.attempt_timeout;
    match timeout(limit, context.durable.set(&write.identifier, &write.record)).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::new(
            StoreErrorKind::Timeout,
            format!("durable write timed out after {:?}", limit),
        )),
    }
}

/// A write counts once against durable health, when its final outcome is known.
async fn persist(context: &WorkerContext, write: DurableWrite) {
    let settings = &context.settings;
    let health = &context.health;
    let started = Instant::now();

    let mut attempt = 0;
    let outcome = loop {
        let outcome = classify(attempt_write(context, &write).await);
        match outcome {
            WriteOutcome::Retryable(e) if attempt + 1 < settings.max_attempts => {
                let delay = settings.base_delay * 2u32.saturating_pow(attempt);
                warn!(
                    "Durable write for {} failed (attempt {}/{}), retrying in {:?}: {}",
                    write.identifier,
                    attempt + 1,
                    settings.max_attempts,
                    delay,
                    e
                );
                health.record_retry();
                sleep(delay).await;
                attempt += 1;
            }
            outcome => break outcome,
        }
    };

    let now = Utc::now();
    let latency = started.elapsed();
    let succeeded = outcome == WriteOutcome::Success;
    health.record_operation(succeeded, latency, now);

    match &outcome {
        WriteOutcome::Success => {
            health.record_success(now);
            info!(
                "Persisted {} = {} to {} in {:?}",
                write.identifier,
                write.record.current,
                context.durable.name(),
                latency
            );
        }
        WriteOutcome::PushFailure(_) => {
            health.set_push_needed(true);
            health.record_failure(now);
            warn!(
                "Committed {} locally but push failed, will retry push",
                write.identifier
            );
        }
        WriteOutcome::NonRetryable(_) => health.record_failure(now),
        WriteOutcome::Retryable(_) => {
            health.set_push_needed(true);
            health.record_failure(now);
        }
    }

    if let Some(err) = outcome.into_error()
        && !matches!(err, ServiceError::PushFailure(_))
    {
        error!(
            "Giving up on durable write for {} after {} attempt(s): {}",
            write.identifier,
            attempt + 1,
            err
        );
    }
}
