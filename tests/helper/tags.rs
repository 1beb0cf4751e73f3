//! Tag discovery test double

use async_trait::async_trait;

use version_service::discovery::{TagDiscovery, TagError};

/// Returns the same answer for every group
pub struct StaticTags {
    tag: Option<String>,
}

impl StaticTags {
    pub fn with_tag(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
        }
    }

    pub fn empty() -> Self {
        Self { tag: None }
    }
}

#[async_trait]
impl TagDiscovery for StaticTags {
    async fn latest_tag(&self, _group_id: &str) -> Result<Option<String>, TagError> {
        Ok(self.tag.clone())
    }
}
