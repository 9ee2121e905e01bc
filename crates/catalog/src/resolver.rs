//! Image reference to parsed catalog.
//!
//! ```text
//! resolve identity ─► cache lookup ─┬─ hit ─────────────────────────────────┐
//!                                   └─ miss ─► fetch by digest ─► scan ─►   │
//!                                              promote ───────────────────► load
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::backend::ImageBackend;
use crate::cache::{CacheKey, CatalogCache};
use crate::declcfg::{CatalogLoader, DeclarativeConfigLoader};
use crate::extract::{ArchiveExtractor, TarExtractor};
use crate::layout::OciLayout;
use crate::model::ParsedCatalog;
use crate::scan::LayerScanner;
use crate::{Error, Result};

/// Resolves catalog images into [`ParsedCatalog`]s, caching by digest.
#[derive(Clone)]
pub struct CatalogResolver {
    backend: Arc<dyn ImageBackend>,
    cache: Arc<CatalogCache>,
    extractor: Arc<dyn ArchiveExtractor>,
    loader: Arc<dyn CatalogLoader>,
    scratch_root: PathBuf,
}

impl CatalogResolver {
    /// Create a resolver with the tar extractor and declarative config loader.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        cache: Arc<CatalogCache>,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            backend,
            cache,
            extractor: Arc::new(TarExtractor),
            loader: Arc::new(DeclarativeConfigLoader),
            scratch_root,
        }
    }

    /// Replace the archive extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace the catalog loader.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn CatalogLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// The cache this resolver promotes into.
    #[must_use]
    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    /// Resolve `image_ref` and load its catalog.
    #[instrument(skip(self, image_ref, cancel), fields(image = %image_ref))]
    pub async fn resolve(
        &self,
        image_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<ParsedCatalog> {
        let configs = self.ensure_cached(image_ref, cancel).await?;

        debug!(path = %configs.display(), "Loading declarative config");
        let loader = Arc::clone(&self.loader);
        let catalog = run_blocking(cancel, "catalog load", move || loader.load(&configs)).await?;
        Ok(catalog)
    }

    /// Make sure the catalog of `image_ref` is cached and return its `configs` path.
    pub async fn ensure_cached(
        &self,
        image_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        if image_ref.is_empty() {
            return Err(Error::CatalogRequired);
        }

        let identity = cancellable(
            cancel,
            "identity resolution",
            self.backend.resolve_identity(image_ref),
        )
        .await
        .map_err(|e| match e {
            Error::Cancelled { .. } | Error::RemoteInfo { .. } | Error::InvalidReference(..) => e,
            other => Error::remote_info(image_ref, other.to_string()),
        })?;
        let key = CacheKey::from(&identity);

        debug!(path = %self.cache.entry_path(&key).display(), "Checking for cached catalog");
        let lookup = self.cache.lookup(&key);
        if lookup.hit {
            debug!("Cache hit, loading catalog from existing directory");
            return Ok(lookup.path);
        }

        let _guard = cancellable(cancel, "cache lock", async {
            Ok(self.cache.lock(&key).await)
        })
        .await?;
        let lookup = self.cache.lookup(&key);
        if lookup.hit {
            debug!("Catalog cached by a concurrent resolution");
            return Ok(lookup.path);
        }

        info!(digest = %identity.digest, "Cache miss, pulling image and extracting catalog");
        let layout_dir = scratch_dir(&self.scratch_root, "lumen-oci-layout-")?;
        let pinned = identity.pinned_reference();
        cancellable(
            cancel,
            "image fetch",
            self.backend.fetch_layout(&pinned, layout_dir.path()),
        )
        .await
        .map_err(|e| match e {
            Error::Cancelled { .. } | Error::Fetch { .. } => e,
            other => Error::fetch(&pinned, other.to_string()),
        })?;

        let extract_dir = scratch_dir(&self.scratch_root, "lumen-extract-")?;
        let extractor = Arc::clone(&self.extractor);
        let cache = Arc::clone(&self.cache);
        let token = cancel.clone();
        let path = run_blocking(cancel, "layer scan", move || {
            let layout = OciLayout::open(layout_dir.path())?;
            let root = LayerScanner::new(&layout, extractor.as_ref()).find_catalog_root(
                layout.layers(),
                extract_dir.path(),
                &token,
            )?;
            info!(
                layer = root.layer_index(),
                digest = %root.layer_digest(),
                "Promoting catalog into cache"
            );
            cache.promote(&root.configs_dir(), &key)
        })
        .await?;

        Ok(path)
    }
}

/// Create a scratch directory removed when dropped.
fn scratch_dir(parent: &Path, prefix: &str) -> Result<tempfile::TempDir> {
    std::fs::create_dir_all(parent)?;
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(parent)
        .map_err(Error::from)
}

/// Await `future` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    stage: &'static str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled { stage }),
        result = future => result,
    }
}

/// Run blocking filesystem work off the async runtime.
///
/// The closure owns its scratch directories, so they are cleaned up when
/// it finishes even if the caller stopped waiting.
async fn run_blocking<T, F>(
    cancel: &CancellationToken,
    stage: &'static str,
    work: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    cancellable(cancel, stage, async {
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Task(e.to_string())),
        }
    })
    .await
}
