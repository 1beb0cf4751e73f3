//! Locate the current version of an identifier across tiers
//!
//! Lookup order: cache, durable store, tag discovery, then the default
//! version. A record found only in the durable store is copied into the
//! cache; a record found nowhere is created and saved.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::discovery::tags::TagDiscovery;
use crate::service::error::ServiceError;
use crate::service::pipeline::PersistencePipeline;
use crate::storage::store::{DurableStore, VersionStore};
use crate::version::record::{Identifier, VersionRecord};
use crate::version::semver::{DEFAULT_VERSION, SemVer};

pub struct Resolver {
    cache: Arc<dyn VersionStore>,
    durable: Arc<dyn DurableStore>,
    tags: Option<Arc<dyn TagDiscovery>>,
    pipeline: Arc<PersistencePipeline>,
}

impl Resolver {
    pub fn new(
        cache: Arc<dyn VersionStore>,
        durable: Arc<dyn DurableStore>,
        tags: Option<Arc<dyn TagDiscovery>>,
        pipeline: Arc<PersistencePipeline>,
    ) -> Self {
        Self {
            cache,
            durable,
            tags,
            pipeline,
        }
    }

    /// Existing record for `identifier` from the cache or the durable store.
    ///
    /// A durable hit is copied into the cache on a best-effort basis.
    pub async fn find(&self, identifier: &str) -> Result<Option<VersionRecord>, ServiceError> {
        match self.cache.get(identifier).await {
            Ok(Some(record)) => {
                debug!("Cache hit for {}", identifier);
                return Ok(Some(record));
            }
            Ok(None) => debug!("Cache miss for {}", identifier),
            Err(e) => warn!("Cache lookup failed for {}, treating as miss: {}", identifier, e),
        }

        let Some(record) = self
            .durable
            .get(identifier)
            .await
            .map_err(ServiceError::DurableUnavailable)?
        else {
            return Ok(None);
        };

        debug!("Durable hit for {}", identifier);
        if let Err(e) = self.cache.set(identifier, &record).await {
            warn!("Failed to populate cache for {}: {}", identifier, e);
        }
        Ok(Some(record))
    }

    pub async fn resolve(&self, identifier: &str) -> Result<VersionRecord, ServiceError> {
        let parsed = Identifier::parse(identifier)?;

        if let Some(record) = self.find(identifier).await? {
            return Ok(record);
        }

        let current = match self.discover_seed(parsed.group_id()).await {
            Some(seed) => seed,
            None => SemVer::parse(DEFAULT_VERSION)?,
        };

        let record = VersionRecord::new(&parsed, current, Utc::now());
        self.pipeline.save(&record).await?;
        info!("Created {} at {}", identifier, record.current);

        Ok(record)
    }

    async fn discover_seed(&self, group_id: &str) -> Option<SemVer> {
        let tags = self.tags.as_ref()?;

        let tag = match tags.latest_tag(group_id).await {
            Ok(Some(tag)) => tag,
            Ok(None) => return None,
            Err(e) => {
                warn!("Tag discovery failed for group {}: {}", group_id, e);
                return None;
            }
        };

        SemVer::parse(&tag)
            .inspect(|seed| info!("Seeding group {} from tag {}", group_id, seed))
            .inspect_err(|e| warn!("Ignoring unusable tag for group {}: {}", group_id, e))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::error::TagError;
    use crate::discovery::tags::MockTagDiscovery;
    use crate::service::health::HealthMonitor;
    use crate::service::pipeline::PipelineSettings;
    use crate::storage::cache::SqliteCache;
    use crate::storage::document::DocumentStore;
    use mockall::predicate::eq;
    use rstest::rstest;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        cache: Arc<SqliteCache>,
        durable: Arc<DocumentStore>,
        pipeline: Arc<PersistencePipeline>,
    }

    impl Fixture {
        async fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let remote = temp_dir.path().join("remote");
            std::fs::create_dir_all(&remote).unwrap();
            let durable = Arc::new(
                DocumentStore::open(&temp_dir.path().join("local"), &remote)
                    .await
                    .unwrap(),
            );
            let cache = Arc::new(SqliteCache::in_memory(60_000).unwrap());
            let pipeline = Arc::new(PersistencePipeline::new(
                cache.clone(),
                durable.clone(),
                Arc::new(HealthMonitor::new()),
                PipelineSettings::default(),
            ));
            Self {
                _temp_dir: temp_dir,
                cache,
                durable,
                pipeline,
            }
        }

        fn resolver(&self, tags: Option<MockTagDiscovery>) -> Resolver {
            Resolver::new(
                self.cache.clone(),
                self.durable.clone(),
                tags.map(|t| Arc::new(t) as Arc<dyn TagDiscovery>),
                self.pipeline.clone(),
            )
        }
    }

    fn record(id: &str, version: SemVer) -> VersionRecord {
        VersionRecord::new(&Identifier::parse(id).unwrap(), version, Utc::now())
    }

    #[tokio::test]
    async fn resolve_rejects_malformed_identifier() {
        let fixture = Fixture::new().await;
        let err = fixture.resolver(None).resolve("nodash").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn resolve_prefers_cache() {
        let fixture = Fixture::new().await;
        fixture
            .cache
            .set("7-web", &record("7-web", SemVer::new(3, 0, 0)))
            .await
            .unwrap();
        fixture
            .durable
            .set("7-web", &record("7-web", SemVer::new(2, 0, 0)))
            .await
            .unwrap();

        let resolved = fixture.resolver(None).resolve("7-web").await.unwrap();
        assert_eq!(resolved.current, SemVer::new(3, 0, 0));
    }

    #[tokio::test]
    async fn resolve_durable_hit_populates_cache() {
        let fixture = Fixture::new().await;
        fixture
            .durable
            .set("7-web", &record("7-web", SemVer::new(2, 4, 1)))
            .await
            .unwrap();

        let resolved = fixture.resolver(None).resolve("7-web").await.unwrap();

        assert_eq!(resolved.current, SemVer::new(2, 4, 1));
        let cached = fixture.cache.get("7-web").await.unwrap().unwrap();
        assert_eq!(cached.current, SemVer::new(2, 4, 1));
    }

    #[tokio::test]
    async fn resolve_unseen_identifier_defaults_and_persists() {
        let fixture = Fixture::new().await;

        let resolved = fixture.resolver(None).resolve("5678-payment-gateway").await.unwrap();

        assert_eq!(resolved.current.to_string(), DEFAULT_VERSION);
        assert_eq!(resolved.group_id, "5678");
        assert_eq!(resolved.name, "payment-gateway");
        assert!(fixture.cache.get("5678-payment-gateway").await.unwrap().is_some());

        fixture.pipeline.shutdown().await;
        let stored = fixture.durable.get("5678-payment-gateway").await.unwrap();
        assert_eq!(stored.map(|r| r.current.to_string()), Some(DEFAULT_VERSION.to_string()));
    }

    #[tokio::test]
    async fn resolve_seeds_from_discovered_tag() {
        let fixture = Fixture::new().await;
        let mut tags = MockTagDiscovery::new();
        tags.expect_latest_tag()
            .with(eq("99"))
            .times(1)
            .returning(|_| Ok(Some("4.2.0".to_string())));

        let resolved = fixture.resolver(Some(tags)).resolve("99-svc").await.unwrap();
        assert_eq!(resolved.current, SemVer::new(4, 2, 0));
    }

    #[rstest]
    #[case::not_found(Ok(None))]
    #[case::unusable_tag(Ok(Some("latest".to_string())))]
    #[case::lookup_failed(Err(TagError::UnexpectedStatus { status: 502 }))]
    #[tokio::test]
    async fn resolve_falls_back_to_default_without_usable_seed(
        #[case] response: Result<Option<String>, TagError>,
    ) {
        let fixture = Fixture::new().await;
        let mut tags = MockTagDiscovery::new();
        tags.expect_latest_tag()
            .times(1)
            .return_once(move |_| response);

        let resolved = fixture.resolver(Some(tags)).resolve("99-svc").await.unwrap();
        assert_eq!(resolved.current.to_string(), DEFAULT_VERSION);
    }
}
