//! Content-addressed cache of extracted catalogs.
//!
//! Entries are keyed by repository, tag and manifest digest; the digest is
//! what makes an entry trustworthy, the tag only keeps the tree readable.
//!
//! Structure:
//! ```text
//! <working_dir>/operator-catalogs/
//! └── registry.redhat.io/redhat/redhat-operator-index/   # repository
//!     └── v4.16/                                         # tag
//!         └── sha256-abc123.../                          # digest token
//!             └── configs/                               # catalog root
//! ```
//!
//! Promotion is serialised per key inside one process. Across processes
//! the content for a digest is assumed identical, so a writer that finds
//! the entry already in place simply discards its own copy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::model::{CATALOG_MARKER, ContentDigest, ImageIdentity};
use crate::{Error, Result};

/// Cache key derived from an image identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    repository: String,
    tag: String,
    digest: ContentDigest,
}

impl CacheKey {
    /// Build a key from its parts.
    #[must_use]
    pub fn new(repository: impl Into<String>, tag: impl Into<String>, digest: ContentDigest) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            digest,
        }
    }

    /// Path of the entry relative to the cache root, excluding `configs`.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for segment in self.repository.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        if !self.tag.is_empty() {
            path.push(&self.tag);
        }
        path.push(self.digest.path_token());
        path
    }
}

impl From<&ImageIdentity> for CacheKey {
    fn from(identity: &ImageIdentity) -> Self {
        Self::new(&identity.repository, &identity.tag, identity.digest.clone())
    }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// Where the entry's `configs` directory lives (or would live).
    pub path: PathBuf,
    /// Whether the entry exists.
    pub hit: bool,
}

/// On-disk catalog cache.
#[derive(Debug)]
pub struct CatalogCache {
    root: PathBuf,
    locks: Mutex<HashMap<CacheKey, KeyMutex>>,
}

type KeyMutex = Arc<tokio::sync::Mutex<()>>;

/// Held per-key lock returned by [`CatalogCache::lock`].
#[derive(Debug)]
pub struct CacheLock<'a> {
    cache: &'a CatalogCache,
    key: CacheKey,
    mutex: KeyMutex,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CacheLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.cache.key_locks();
        // Table entry plus ours: nobody is waiting.
        let idle = locks
            .get(&self.key)
            .is_some_and(|m| Arc::ptr_eq(m, &self.mutex) && Arc::strong_count(m) == 2);
        if idle {
            locks.remove(&self.key);
        }
    }
}

impl CatalogCache {
    /// Create a cache rooted at `root` (usually `<working_dir>/operator-catalogs`).
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get the cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the `configs` directory for `key`.
    #[must_use]
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path()).join(CATALOG_MARKER)
    }

    /// Check whether `key` has been promoted.
    #[must_use]
    pub fn lookup(&self, key: &CacheKey) -> Lookup {
        let path = self.entry_path(key);
        let hit = path.is_dir();
        if hit {
            trace!(path = %path.display(), "Cache hit for catalog");
        } else {
            trace!(path = %path.display(), "Cache miss for catalog");
        }
        Lookup { path, hit }
    }

    /// Serialise fetch-and-promote for `key` within this process.
    ///
    /// The per-key mutex is dropped from the table once its last holder
    /// releases it and nobody else is waiting.
    pub async fn lock(&self, key: &CacheKey) -> CacheLock<'_> {
        let mutex = {
            let mut locks = self.key_locks();
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&mutex).lock_owned().await;
        CacheLock {
            cache: self,
            key: key.clone(),
            mutex,
            guard: Some(guard),
        }
    }

    fn key_locks(&self) -> MutexGuard<'_, HashMap<CacheKey, KeyMutex>> {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Number of keys with a live in-process lock.
    #[must_use]
    pub fn locked_keys(&self) -> usize {
        self.key_locks().len()
    }

    /// Move a fully extracted `configs` directory into place for `key`.
    ///
    /// A plain rename is tried first. When that is not possible (for
    /// example across filesystems) the tree is copied into a hidden
    /// sibling and renamed from there, so readers never see a partial
    /// entry.
    pub fn promote(&self, scratch: &Path, key: &CacheKey) -> Result<PathBuf> {
        let dest = self.entry_path(key);
        let parent = dest
            .parent()
            .ok_or_else(|| Error::cache(&dest, "entry has no parent directory"))?;
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::cache(parent, format!("failed to create directory: {e}")))?;

        if dest.is_dir() {
            debug!(path = %dest.display(), "Catalog already cached, discarding new copy");
            return Ok(dest);
        }

        match std::fs::rename(scratch, &dest) {
            Ok(()) => {
                debug!(path = %dest.display(), "Promoted catalog into cache");
                return Ok(dest);
            }
            Err(e) => {
                trace!(error = %e, "Rename into cache failed, copying instead");
            }
        }

        let staging = tempfile::Builder::new()
            .prefix(".configs-")
            .tempdir_in(parent)
            .map_err(|e| Error::cache(parent, format!("failed to create staging directory: {e}")))?;
        copy_dir(scratch, staging.path())?;

        let staged = staging.keep();
        if let Err(e) = std::fs::rename(&staged, &dest) {
            let _ = std::fs::remove_dir_all(&staged);
            if dest.is_dir() {
                debug!(path = %dest.display(), "Catalog cached concurrently, discarding new copy");
                return Ok(dest);
            }
            return Err(Error::cache(&dest, format!("failed to move entry into place: {e}")));
        }

        debug!(path = %dest.display(), "Copied catalog into cache");
        Ok(dest)
    }
}

/// Recursively copy `src` into the existing directory `dst`.
fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| src.to_path_buf(), Path::to_path_buf);
            Error::cache(&path, e.to_string())
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::cache(entry.path(), e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| Error::cache(&target, format!("failed to create directory: {e}")))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)
                .map_err(|e| Error::cache(&target, format!("failed to copy file: {e}")))?;
        }
    }
    Ok(())
}
