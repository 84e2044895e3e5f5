//! Cold Tier - Compressed Disk Store
//!
//! One compressed file per entry under `<base>/cold/<key>.<ext>`, plus a
//! flat JSON index. Compression and decompression run on the blocking
//! pool; a payload that fails to decompress or verify is reported as
//! [`Error::Corruption`], never as a miss.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::compression::{CompressionAlgorithm, CompressionManager};
use super::entry::{ContentMetadata, Tier};
use super::index::{file_stem, write_atomic, TierIndex, INDEX_FILE_NAME};
use super::warm::remove_if_exists;
use crate::domain::ports::TierStore;
use crate::error::{Error, Result};

/// Index record for a cold entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdRecord {
    /// Entry metadata (sizes refer to the uncompressed payload)
    #[serde(flatten)]
    pub metadata: ContentMetadata,
    /// Algorithm the data file was written with
    pub algorithm: CompressionAlgorithm,
    /// Bytes on disk
    pub stored_bytes: u64,
}

/// Cold tier store
pub struct ColdStore {
    dir: PathBuf,
    index: TierIndex<ColdRecord>,
    compression: Arc<CompressionManager>,
}

impl ColdStore {
    /// Open (or create) the cold tier rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>, compression: Arc<CompressionManager>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let index_path = dir.join(INDEX_FILE_NAME);
        let index = match TierIndex::load(&index_path).await {
            Ok(index) => index,
            Err(e) => {
                warn!(path = %index_path.display(), error = %e, "Cold index unreadable, starting empty");
                TierIndex::empty(&index_path)
            }
        };

        let store = Self {
            dir,
            index,
            compression,
        };
        store.reconcile().await?;
        Ok(store)
    }

    async fn reconcile(&self) -> Result<()> {
        let mut missing = Vec::new();
        for (key, record) in self.index.entries() {
            let path = self.data_path(&key, record.algorithm)?;
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                missing.push(key);
            }
        }
        if !missing.is_empty() {
            warn!(count = missing.len(), "Dropping cold index entries without data files");
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

    /// Path of the data file for a key written with `algorithm`
    pub fn data_path(&self, key: &str, algorithm: CompressionAlgorithm) -> Result<PathBuf> {
        Ok(self
            .dir
            .join(format!("{}.{}", file_stem(key)?, algorithm.file_extension())))
    }

    /// Index record for a key
    pub fn record(&self, key: &str) -> Option<ColdRecord> {
        self.index.get(key)
    }

    /// Bytes on disk across all entries
    pub fn stored_bytes(&self) -> u64 {
        self.index
            .entries()
            .iter()
            .map(|(_, r)| r.stored_bytes)
            .sum()
    }

    /// Remove every entry
    pub async fn clear(&self) -> Result<()> {
        let doomed = self.index.entries();
        self.index.retain(|_, _| false);
        for (key, record) in doomed {
            if let Ok(path) = self.data_path(&key, record.algorithm) {
                remove_if_exists(&path).await?;
            }
        }
        self.index.persist().await
    }
}

#[async_trait]
impl TierStore for ColdStore {
    fn tier(&self) -> Tier {
        Tier::Cold
    }

    async fn write(&self, key: &str, content: Bytes, metadata: ContentMetadata) -> Result<()> {
        let manager = Arc::clone(&self.compression);
        let raw = content.clone();
        let (stored, algorithm) = tokio::task::spawn_blocking(move || manager.compress(&raw))
            .await
            .map_err(|e| Error::Internal(format!("compression task failed: {}", e)))?;

        let path = self.data_path(key, algorithm)?;
        write_atomic(&path, &stored).await?;

        let record = ColdRecord {
            metadata: metadata.in_tier(Tier::Cold),
            algorithm,
            stored_bytes: stored.len() as u64,
        };
        let previous = self.index.insert(key, record);
        if let Err(e) = self.index.persist().await {
            match previous {
                Some(old) => {
                    let old_algorithm = old.algorithm;
                    self.index.insert(key, old);
                    if old_algorithm != algorithm {
                        let _ = remove_if_exists(&path).await;
                    }
                }
                None => {
                    self.index.remove(key);
                    let _ = remove_if_exists(&path).await;
                }
            }
            return Err(e);
        }

        // A rewrite with a different algorithm leaves the old file behind
        if let Some(old) = previous.filter(|old| old.algorithm != algorithm) {
            if let Ok(old_path) = self.data_path(key, old.algorithm) {
                remove_if_exists(&old_path).await?;
            }
        }

        debug!(
            key,
            bytes = content.len(),
            stored = stored.len(),
            algorithm = %algorithm,
            "Wrote cold entry"
        );
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        let Some(record) = self.index.get(key) else {
            return Ok(None);
        };

        let raw = tokio::fs::read(self.data_path(key, record.algorithm)?).await?;

        let manager = Arc::clone(&self.compression);
        let algorithm = record.algorithm;
        let decoded = tokio::task::spawn_blocking(move || manager.decompress(&raw, algorithm))
            .await
            .map_err(|e| Error::Internal(format!("decompression task failed: {}", e)))?;

        let content = decoded.map_err(|e| Error::corruption(key, e))?;
        if !record.metadata.verify(&content) {
            return Err(Error::corruption(
                key,
                format!(
                    "decompressed {} bytes, expected {} with matching content hash",
                    content.len(),
                    record.metadata.size_bytes()
                ),
            ));
        }
        Ok(Some(content))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let Some(record) = self.index.get(key) else {
            return Ok(false);
        };
        let path = self.data_path(key, record.algorithm)?;

        self.index.remove(key);
        if let Err(e) = remove_if_exists(&path).await {
            self.index.insert(key, record);
            return Err(e);
        }
        // Reopening drops a persisted entry whose file is gone
        self.index.persist().await?;
        Ok(true)
    }

    fn metadata(&self, key: &str) -> Option<ContentMetadata> {
        self.index.get(key).map(|r| r.metadata)
    }

    fn set_metadata(&self, key: &str, metadata: ContentMetadata) -> bool {
        self.index
            .update(key, |r| r.metadata = metadata.in_tier(Tier::Cold))
    }

    fn entries(&self) -> Vec<(String, ContentMetadata)> {
        self.index
            .entries()
            .into_iter()
            .map(|(k, r)| (k, r.metadata))
            .collect()
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn size_bytes(&self) -> u64 {
        self.index
            .entries()
            .iter()
            .map(|(_, r)| r.metadata.size_bytes())
            .sum()
    }

    async fn flush(&self) -> Result<()> {
        self.index.persist_if_dirty().await
    }
}

// =============================================================================
// Tests
// =============================================================================
