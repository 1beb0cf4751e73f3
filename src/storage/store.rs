//! Storage contracts shared by the cache and durable tiers

use crate::storage::error::StoreError;
use crate::version::record::{VersionMap, VersionRecord};

/// Keyed record storage used by both tiers
#[async_trait::async_trait]
pub trait VersionStore: Send + Sync {
    /// Short label used in logs and health reports
    fn name(&self) -> &'static str;

    /// Fetch one record; `Ok(None)` when the identifier is unknown
    async fn get(&self, identifier: &str) -> Result<Option<VersionRecord>, StoreError>;

    async fn set(&self, identifier: &str, record: &VersionRecord) -> Result<(), StoreError>;

    async fn list_all(&self) -> Result<VersionMap, StoreError>;

    /// Records whose identifier belongs to `group_id`
    async fn list_by_prefix(&self, group_id: &str) -> Result<VersionMap, StoreError>;

    async fn delete(&self, identifier: &str) -> Result<(), StoreError>;

    async fn health(&self) -> Result<(), StoreError>;

    /// Replace the store's contents with `records` in bulk
    async fn rebuild(&self, records: &VersionMap) -> Result<(), StoreError>;
}

/// Authoritative tier. May hold writes that were committed locally but not
/// yet synchronized upstream.
#[async_trait::async_trait]
pub trait DurableStore: VersionStore {
    /// Synchronize locally committed writes upstream.
    ///
    /// Stores without a separate synchronization step keep the default, which
    /// reports the capability as unsupported.
    async fn push_pending_writes(&self) -> Result<(), StoreError> {
        Err(StoreError::unsupported(format!(
            "{} does not support pushing pending writes",
            self.name()
        )))
    }
}

/// Keep only the records belonging to `group_id`
pub fn filter_by_group(records: VersionMap, group_id: &str) -> VersionMap {
    let prefix = crate::version::record::group_prefix(group_id);
    records
        .into_iter()
        .filter(|(id, _)| id.starts_with(&prefix))
        .collect()
}
