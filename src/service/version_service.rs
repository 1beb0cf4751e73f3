use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{HealthConfig, LockMode, ServiceConfig};
use crate::discovery::tags::TagDiscovery;
use crate::service::error::ServiceError;
use crate::service::health::{HealthMonitor, HealthStatus, Metrics};
use crate::service::lock::IncrementLock;
use crate::service::maintenance::{MaintenanceHandle, retry_pending_push, spawn_maintenance};
use crate::service::pipeline::{PersistencePipeline, PipelineSettings};
use crate::service::resolver::Resolver;
use crate::storage::store::{DurableStore, VersionStore};
use crate::version::record::{Identifier, IncrementKind, VersionMap, VersionRecord};
use crate::version::semver::SemVer;

/// Tunables for [`VersionService`]
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub pipeline: PipelineSettings,
    pub lock_mode: LockMode,
    pub health: HealthConfig,
}

impl From<&ServiceConfig> for ServiceOptions {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            pipeline: PipelineSettings::from(&config.persistence),
            lock_mode: config.lock_mode,
            health: config.health.clone(),
        }
    }
}

/// Per-tier health
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub cache: HealthStatus,
    pub durable: HealthStatus,
    pub push_needed: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.cache.is_healthy() && self.durable.is_healthy()
    }
}

/// Entry point for reading and changing versions
pub struct VersionService {
    cache: Arc<dyn VersionStore>,
    durable: Arc<dyn DurableStore>,
    resolver: Resolver,
    pipeline: Arc<PersistencePipeline>,
    health: Arc<HealthMonitor>,
    lock: IncrementLock,
    health_config: HealthConfig,
}

impl VersionService {
    /// Build the service and start its durable write workers.
    pub fn new(
        cache: Arc<dyn VersionStore>,
        durable: Arc<dyn DurableStore>,
        tags: Option<Arc<dyn TagDiscovery>>,
        options: ServiceOptions,
    ) -> Self {
        let health = Arc::new(HealthMonitor::new());
        let pipeline = Arc::new(PersistencePipeline::new(
            Arc::clone(&cache),
            Arc::clone(&durable),
            Arc::clone(&health),
            options.pipeline,
        ));
        let resolver = Resolver::new(
            Arc::clone(&cache),
            Arc::clone(&durable),
            tags,
            Arc::clone(&pipeline),
        );

        Self {
            cache,
            durable,
            resolver,
            pipeline,
            health,
            lock: IncrementLock::new(options.lock_mode),
            health_config: options.health,
        }
    }

    /// Load every durable record into the cache.
    ///
    /// Returns the number of records loaded. A durable failure is fatal; a
    /// cache failure only means reads start cold.
    pub async fn initialize(&self) -> Result<usize, ServiceError> {
        let records = self
            .durable
            .list_all()
            .await
            .map_err(ServiceError::DurableUnavailable)?;

        match self.cache.rebuild(&records).await {
            Ok(()) => info!("Loaded {} records into cache", records.len()),
            Err(e) => warn!("Failed to rebuild cache from durable store: {}", e),
        }

        Ok(records.len())
    }

    pub async fn get_version(&self, identifier: &str) -> Result<VersionRecord, ServiceError> {
        self.resolver.resolve(identifier).await
    }

    /// Bump the version of `identifier` and return the new value.
    pub async fn increment_version(
        &self,
        identifier: &str,
        kind: IncrementKind,
    ) -> Result<SemVer, ServiceError> {
        Identifier::parse(identifier)?;
        let _guard = self.lock.acquire(identifier).await;

        let record = self.resolver.resolve(identifier).await?;
        let next = kind.apply(&record.current)?;
        let updated = record.with_version(next.clone(), Utc::now());
        self.pipeline.save(&updated).await?;

        info!(
            "Incremented {} ({}): {} -> {}",
            identifier, kind, record.current, next
        );
        Ok(next)
    }

    /// Overwrite the version of `identifier`, creating the record if needed.
    pub async fn set_version(
        &self,
        identifier: &str,
        version: &str,
    ) -> Result<VersionRecord, ServiceError> {
        let parsed = Identifier::parse(identifier)?;
        let version = SemVer::parse(version)?;
        let _guard = self.lock.acquire(identifier).await;

        let now = Utc::now();
        let record = match self.resolver.find(identifier).await? {
            Some(existing) => {
                info!("Set {}: {} -> {}", identifier, existing.current, version);
                existing.with_version(version, now)
            }
            None => {
                info!("Set {} to {} (new record)", identifier, version);
                VersionRecord::new(&parsed, version, now)
            }
        };

        self.pipeline.save(&record).await?;
        Ok(record)
    }

    /// Development build version for a commit. Nothing is persisted beyond
    /// what resolving the identifier does.
    pub async fn dev_version(
        &self,
        identifier: &str,
        sha: &str,
        branch: Option<&str>,
    ) -> Result<SemVer, ServiceError> {
        let record = self.resolver.resolve(identifier).await?;
        let dev = record.current.with_dev_suffix(sha);
        debug!(
            "Dev version for {} on {}: {}",
            identifier,
            branch.unwrap_or("(unknown branch)"),
            dev
        );
        Ok(dev)
    }

    pub async fn list_versions(&self) -> Result<VersionMap, ServiceError> {
        match self.cache.list_all().await {
            Ok(records) => Ok(records),
            Err(e) => {
                let e = ServiceError::CacheUnavailable(e);
                warn!("Listing failed with {}, reading durable store", e);
                self.durable
                    .list_all()
                    .await
                    .map_err(ServiceError::DurableUnavailable)
            }
        }
    }

    pub async fn list_versions_by_group(&self, group_id: &str) -> Result<VersionMap, ServiceError> {
        match self.cache.list_by_prefix(group_id).await {
            Ok(records) => Ok(records),
            Err(e) => {
                let e = ServiceError::CacheUnavailable(e);
                warn!(
                    "Listing group {} failed with {}, reading durable store",
                    group_id, e
                );
                self.durable
                    .list_by_prefix(group_id)
                    .await
                    .map_err(ServiceError::DurableUnavailable)
            }
        }
    }

    pub async fn health_report(&self) -> HealthReport {
        let cache = match self.cache.health().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        };

        let probe = self.durable.health().await;
        let durable = self.health.status(
            Utc::now(),
            self.health_config.window(),
            probe.as_ref().map(|_| ()),
        );

        HealthReport {
            cache,
            durable,
            push_needed: self.health.push_needed(),
        }
    }

    pub fn metrics_snapshot(&self) -> Metrics {
        self.health.metrics()
    }

    /// Run one push retry sweep now instead of waiting for the periodic task.
    pub async fn retry_pending_push(&self) -> bool {
        retry_pending_push(
            self.durable.as_ref(),
            &self.health,
            self.health_config.push_retry_timeout(),
        )
        .await
    }

    /// Start the periodic metrics summary and push retry tasks.
    pub fn spawn_maintenance(&self) -> MaintenanceHandle {
        spawn_maintenance(
            Arc::clone(&self.durable),
            Arc::clone(&self.health),
            self.health_config.maintenance_interval(),
            self.health_config.push_retry_timeout(),
        )
    }

    /// Wait for queued durable writes to finish. Later saves fail with
    /// [`ServiceError::PipelineClosed`].
    pub async fn shutdown(&self) {
        self.pipeline.shutdown().await;
    }
}
