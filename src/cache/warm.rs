//! Warm Tier - Uncompressed Disk Store
//!
//! One file per entry under `<base>/warm/`, plus a flat JSON index mapping
//! key → metadata. Payloads are verified against the recorded length and
//! content hash on every read.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use super::entry::{ContentMetadata, Tier};
use super::index::{file_stem, write_atomic, TierIndex, INDEX_FILE_NAME};
use crate::domain::ports::TierStore;
use crate::error::{Error, Result};

/// Warm tier store
pub struct WarmStore {
    dir: PathBuf,
    index: TierIndex<ContentMetadata>,
}

impl WarmStore {
    /// Open (or create) the warm tier rooted at `dir`.
    ///
    /// An unreadable index is logged and replaced by an empty one; index
    /// entries whose data file is missing are dropped.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let index_path = dir.join(INDEX_FILE_NAME);
        let index = match TierIndex::load(&index_path).await {
            Ok(index) => index,
            Err(e) => {
                warn!(path = %index_path.display(), error = %e, "Warm index unreadable, starting empty");
                TierIndex::empty(&index_path)
            }
        };

        let store = Self { dir, index };
        store.reconcile().await?;
        Ok(store)
    }

    async fn reconcile(&self) -> Result<()> {
        let mut missing = Vec::new();
        for (key, _) in self.index.entries() {
            let path = self.data_path(&key)?;
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                missing.push(key);
            }
        }
        if !missing.is_empty() {
            warn!(count = missing.len(), "Dropping warm index entries without data files");
            for key in &missing {
                self.index.remove(key);
            }
            self.index.persist().await?;
        }
        Ok(())
    }

    /// Directory holding the tier
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the data file for a key
    pub fn data_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.dir.join(file_stem(key)?))
    }

    /// Remove every entry
    pub async fn clear(&self) -> Result<()> {
        for key in self.index.retain(|_, _| false) {
            if let Ok(path) = self.data_path(&key) {
                remove_if_exists(&path).await?;
            }
        }
        self.index.persist().await
    }
}

#[async_trait]
impl TierStore for WarmStore {
    fn tier(&self) -> Tier {
        Tier::Warm
    }

    async fn write(&self, key: &str, content: Bytes, metadata: ContentMetadata) -> Result<()> {
        let path = self.data_path(key)?;
        write_atomic(&path, &content).await?;

        let previous = self.index.insert(key, metadata.in_tier(Tier::Warm));
        if let Err(e) = self.index.persist().await {
            // Roll back so the entry stays wholly in its previous tier
            match previous {
                Some(old) => {
                    self.index.insert(key, old);
                }
                None => {
                    self.index.remove(key);
                    let _ = remove_if_exists(&path).await;
                }
            }
            return Err(e);
        }

        debug!(key, bytes = content.len(), "Wrote warm entry");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        let Some(metadata) = self.index.get(key) else {
            return Ok(None);
        };

        let raw = tokio::fs::read(self.data_path(key)?).await?;
        if !metadata.verify(&raw) {
            return Err(Error::corruption(
                key,
                format!(
                    "warm payload is {} bytes or fails its content hash (expected {} bytes)",
                    raw.len(),
                    metadata.size_bytes()
                ),
            ));
        }
        Ok(Some(Bytes::from(raw)))
    }

    /// Drop the entry and its data file, then persist the index.
    ///
    /// When only the index write fails the entry is already gone: the error
    /// is returned, the index stays dirty for the next flush, and a stale
    /// persisted entry is dropped on reopen because its file is missing.
    async fn delete(&self, key: &str) -> Result<bool> {
        if !self.index.contains(key) {
            return Ok(false);
        }
        let path = self.data_path(key)?;
        let Some(old) = self.index.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = remove_if_exists(&path).await {
            self.index.insert(key, old);
            return Err(e);
        }
        self.index.persist().await?;
        Ok(true)
    }

    fn metadata(&self, key: &str) -> Option<ContentMetadata> {
        self.index.get(key)
    }

    fn set_metadata(&self, key: &str, metadata: ContentMetadata) -> bool {
        self.index
            .update(key, |m| *m = metadata.in_tier(Tier::Warm))
    }

    fn entries(&self) -> Vec<(String, ContentMetadata)> {
        self.index.entries()
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn size_bytes(&self) -> u64 {
        self.index
            .entries()
            .iter()
            .map(|(_, m)| m.size_bytes())
            .sum()
    }

    async fn flush(&self) -> Result<()> {
        self.index.persist_if_dirty().await
    }
}

/// Remove a file, treating "already gone" as success
pub(crate) async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Tests
// =============================================================================
