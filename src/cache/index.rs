//! Flat-File Tier Index
//!
//! In-memory `key → metadata` map for an on-disk tier, persisted as a
//! single JSON file next to the data files. Writes go through a temporary
//! file and a rename so a crash never leaves a half-written index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// File name of the index inside a tier directory
pub const INDEX_FILE_NAME: &str = ".index.json";

const INDEX_VERSION: u32 = 1;

#[derive(Deserialize)]
struct IndexFile<V> {
    version: u32,
    entries: HashMap<String, V>,
}

#[derive(Serialize)]
struct IndexFileRef<'a, V> {
    version: u32,
    entries: &'a HashMap<String, V>,
}

/// Key → metadata index for one tier
pub struct TierIndex<V> {
    path: PathBuf,
    entries: RwLock<HashMap<String, V>>,
    dirty: AtomicBool,
}

impl<V> TierIndex<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Create an empty index persisted at `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Load the index at `path`; a missing file yields an empty index
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No index file, starting empty");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(e.into()),
        };

        let file: IndexFile<V> = serde_json::from_slice(&raw)?;
        if file.version != INDEX_VERSION {
            return Err(Error::Internal(format!(
                "unsupported index version {} in {}",
                file.version,
                path.display()
            )));
        }

        Ok(Self {
            path,
            entries: RwLock::new(file.entries),
            dirty: AtomicBool::new(false),
        })
    }

    /// Location of the index file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get metadata for a key
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    /// Check if a key is indexed
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Insert or replace metadata
    pub fn insert(&self, key: &str, value: V) -> Option<V> {
        let old = self.entries.write().insert(key.to_string(), value);
        self.dirty.store(true, Ordering::Release);
        old
    }

    /// Remove a key
    pub fn remove(&self, key: &str) -> Option<V> {
        let removed = self.entries.write().remove(key);
        if removed.is_some() {
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    /// Mutate a value in place
    pub fn update<F: FnOnce(&mut V)>(&self, key: &str, f: F) -> bool {
        let mut guard = self.entries.write();
        match guard.get_mut(key) {
            Some(v) => {
                f(v);
                self.dirty.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Keep only entries matching the predicate, returning removed keys
    pub fn retain<F: FnMut(&str, &V) -> bool>(&self, mut keep: F) -> Vec<String> {
        let mut guard = self.entries.write();
        let doomed: Vec<String> = guard
            .iter()
            .filter(|(k, v)| !keep(k.as_str(), *v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            guard.remove(key);
        }
        if !doomed.is_empty() {
            self.dirty.store(true, Ordering::Release);
        }
        doomed
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<(String, V)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check for unpersisted changes
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Write the index to disk
    pub async fn persist(&self) -> Result<()> {
        // Clear first so changes racing with the write mark it dirty again
        self.dirty.store(false, Ordering::Release);
        let encoded = {
            let guard = self.entries.read();
            let file = IndexFileRef {
                version: INDEX_VERSION,
                entries: &*guard,
            };
            serde_json::to_vec(&file)
        };

        let result = match encoded {
            Ok(bytes) => write_atomic(&self.path, &bytes).await,
            Err(e) => Err(e.into()),
        };
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result
    }

    /// Persist only when there are unsaved changes
    pub async fn persist_if_dirty(&self) -> Result<()> {
        if self.is_dirty() {
            self.persist().await
        } else {
            Ok(())
        }
    }
}

/// Write `bytes` to `path` via a temporary sibling and a rename
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Internal(format!("invalid path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        warn!(path = %path.display(), error = %e, "Rename failed, removing temp file");
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Longest encoded key used verbatim as a file name. Most filesystems cap
/// names at 255 bytes; the rest is left for an extension.
const MAX_STEM_LEN: usize = 240;

/// Map a cache key to a file name inside a tier directory.
///
/// Keys are percent-encoded, and a leading dot is escaped so no key can
/// shadow the index or temporary files. Keys too long to encode in place
/// map to `#` plus the SHA-256 of the key; `#` never survives encoding, so
/// hashed names cannot collide with encoded ones.
pub fn file_stem(key: &str) -> Result<String> {
    if key.is_empty() {
        return Err(Error::InvalidKey(key.to_string()));
    }
    let encoded = urlencoding::encode(key);
    let stem = match encoded.strip_prefix('.') {
        Some(rest) => format!("%2E{}", rest),
        None => encoded.into_owned(),
    };
    if stem.len() > MAX_STEM_LEN {
        return Ok(format!("#{:x}", Sha256::digest(key.as_bytes())));
    }
    Ok(stem)
}

// =============================================================================
// Tests
// =============================================================================
