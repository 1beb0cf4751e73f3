//! Durable tier: a single JSON document with a local working copy and a
//! remote mirror.
//!
//! Writes are committed to the working copy first and then pushed to the
//! remote. A failed push leaves the commit in place and is reported as
//! [`StoreErrorKind::PushFailed`](crate::storage::error::StoreErrorKind::PushFailed) so callers can schedule a later
//! [`DurableStore::push_pending_writes`].

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::storage::error::StoreError;
use crate::storage::store::{DurableStore, VersionStore, filter_by_group};
use crate::version::record::{VersionMap, VersionRecord, VersionsDocument};

/// File name of the document in both the working copy and the remote
pub const DOCUMENT_FILE: &str = "versions.json";

pub struct DocumentStore {
    local_path: PathBuf,
    remote_dir: PathBuf,
    // Serializes pull/commit/push sequences
    lock: Mutex<()>,
}

impl DocumentStore {
    /// Open the store, seeding the working copy from the remote when it has
    /// no document yet.
    ///
    /// An empty remote is initialized with an empty document; failing to push
    /// that initial document is only a warning.
    pub async fn open(working_copy: &Path, remote_dir: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(working_copy).await?;

        let store = Self {
            local_path: working_copy.join(DOCUMENT_FILE),
            remote_dir: remote_dir.to_path_buf(),
            lock: Mutex::new(()),
        };

        if !tokio::fs::try_exists(&store.local_path).await? {
            match tokio::fs::read(store.remote_path()).await {
                Ok(bytes) => {
                    serde_json::from_slice::<VersionsDocument>(&bytes)?;
                    write_atomic(&store.local_path, &bytes).await?;
                    info!("Working copy initialized from {:?}", store.remote_dir);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!("Remote has no document, initializing an empty one");
                    store.commit(&mut VersionsDocument::empty(Utc::now())).await?;
                    if let Err(e) = store.push().await {
                        warn!("Failed to push initial document: {}", e);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "Document store ready: working copy {:?}, remote {:?}",
            store.local_path, store.remote_dir
        );
        Ok(store)
    }

    fn remote_path(&self) -> PathBuf {
        self.remote_dir.join(DOCUMENT_FILE)
    }

    async fn read_local(&self) -> Result<VersionsDocument, StoreError> {
        match tokio::fs::read(&self.local_path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(VersionsDocument::empty(Utc::now()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Adopt the remote document when it is newer than the working copy
    async fn pull(&self) -> Result<(), StoreError> {
        if !tokio::fs::metadata(&self.remote_dir).await?.is_dir() {
            return Err(StoreError::unavailable(format!(
                "remote {:?} is not a directory",
                self.remote_dir
            )));
        }

        let remote_bytes = match tokio::fs::read(self.remote_path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Remote is empty, nothing to pull");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let remote: VersionsDocument = serde_json::from_slice(&remote_bytes)?;
        let local = self.read_local().await?;

        if remote.last_updated > local.last_updated {
            write_atomic(&self.local_path, &remote_bytes).await?;
            debug!("Pulled newer document from remote");
        }

        Ok(())
    }

    async fn pull_or_warn(&self) {
        if let Err(e) = self.pull().await {
            warn!("Failed to pull latest document: {}", e);
        }
    }

    /// Write the document to the working copy
    async fn commit(&self, doc: &mut VersionsDocument) -> Result<(), StoreError> {
        doc.last_updated = Utc::now();
        let bytes = serde_json::to_vec_pretty(doc)?;
        write_atomic(&self.local_path, &bytes).await?;
        Ok(())
    }

    /// Mirror the working copy to the remote
    async fn push(&self) -> Result<(), StoreError> {
        let bytes = tokio::fs::read(&self.local_path).await?;
        write_atomic(&self.remote_path(), &bytes)
            .await
            .map_err(|e| StoreError::push_failed(format!("failed to push: {}", e)))
    }

    async fn has_unpushed_changes(&self) -> Result<bool, StoreError> {
        let local = tokio::fs::read(&self.local_path).await?;
        match tokio::fs::read(self.remote_path()).await {
            Ok(remote) => Ok(local != remote),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn commit_and_push(&self, doc: &mut VersionsDocument) -> Result<(), StoreError> {
        self.commit(doc).await?;
        self.push().await
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait::async_trait]
impl VersionStore for DocumentStore {
    fn name(&self) -> &'static str {
        "durable"
    }

    async fn get(&self, identifier: &str) -> Result<Option<VersionRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        self.pull_or_warn().await;

        let mut doc = self.read_local().await?;
        Ok(doc.versions.remove(identifier))
    }

    async fn set(&self, identifier: &str, record: &VersionRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.pull_or_warn().await;

        let mut doc = self.read_local().await?;
        doc.versions.insert(identifier.to_string(), record.clone());

        self.commit(&mut doc).await?;
        if let Err(e) = self.push().await {
            warn!(
                "Committed {} at {} locally but push failed: {}",
                identifier, record.current, e
            );
            return Err(e);
        }

        info!("Persisted {} at {}", identifier, record.current);
        Ok(())
    }

    async fn list_all(&self) -> Result<VersionMap, StoreError> {
        let _guard = self.lock.lock().await;
        self.pull_or_warn().await;

        Ok(self.read_local().await?.versions)
    }

    async fn list_by_prefix(&self, group_id: &str) -> Result<VersionMap, StoreError> {
        Ok(filter_by_group(self.list_all().await?, group_id))
    }

    async fn delete(&self, identifier: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.pull_or_warn().await;

        let mut doc = self.read_local().await?;
        if doc.versions.remove(identifier).is_none() {
            return Ok(());
        }

        self.commit_and_push(&mut doc).await?;
        info!("Removed {} from durable store", identifier);
        Ok(())
    }

    async fn health(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.pull().await
    }

    async fn rebuild(&self, _records: &VersionMap) -> Result<(), StoreError> {
        // The durable tier is the source a rebuild reads from
        Ok(())
    }
}

#[async_trait::async_trait]
impl DurableStore for DocumentStore {
    async fn push_pending_writes(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;

        if !self.has_unpushed_changes().await? {
            debug!("No unpushed changes found");
            return Ok(());
        }

        info!("Pushing pending changes to remote");
        self.push().await?;
        info!("Successfully pushed pending changes");
        Ok(())
    }
}
