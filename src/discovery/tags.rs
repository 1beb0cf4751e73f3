//! Trait for looking up an existing release tag to seed a new record

#[cfg(test)]
use mockall::automock;

use crate::discovery::error::TagError;

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait TagDiscovery: Send + Sync {
    /// Latest release version published for `group_id`.
    ///
    /// # Returns
    /// * `Ok(Some(version))` - Highest version tag, without any `v` prefix
    /// * `Ok(None)` - Discovery is not configured, the group is unknown, or it has no version tags
    /// * `Err(TagError)` - The lookup itself failed
    async fn latest_tag(&self, group_id: &str) -> Result<Option<String>, TagError>;
}
