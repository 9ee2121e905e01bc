//! Search of image layers for the catalog root.
//!
//! Layers are extracted one at a time, in manifest order, into private
//! scratch directories. The first layer whose extraction root contains
//! [`CATALOG_MARKER`] wins; every other scratch directory is removed as
//! soon as it has been checked.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::BlobSource;
use crate::extract::ArchiveExtractor;
use crate::model::{CATALOG_MARKER, Layer};
use crate::{Error, Result};

/// Extracted layer that contains the catalog root.
///
/// The directory is removed when this value is dropped.
#[derive(Debug)]
pub struct CatalogRoot {
    dir: TempDir,
    layer_index: usize,
    layer_digest: String,
}

impl CatalogRoot {
    /// Extraction root of the matching layer.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The `configs` directory inside the extraction root.
    #[must_use]
    pub fn configs_dir(&self) -> PathBuf {
        self.dir.path().join(CATALOG_MARKER)
    }

    /// Position of the matching layer in the manifest.
    #[must_use]
    pub fn layer_index(&self) -> usize {
        self.layer_index
    }

    /// Digest of the matching layer.
    #[must_use]
    pub fn layer_digest(&self) -> &str {
        &self.layer_digest
    }
}

/// Scans layers for the catalog marker directory.
pub struct LayerScanner<'a> {
    source: &'a dyn BlobSource,
    extractor: &'a dyn ArchiveExtractor,
}

impl<'a> LayerScanner<'a> {
    /// Create a scanner reading blobs from `source`.
    #[must_use]
    pub fn new(source: &'a dyn BlobSource, extractor: &'a dyn ArchiveExtractor) -> Self {
        Self { source, extractor }
    }

    /// Find the first layer, in manifest order, containing the catalog root.
    ///
    /// A layer whose blob cannot be opened or whose archive fails to
    /// extract is skipped. Failure to create a scratch directory under
    /// `scratch_parent` is fatal.
    pub fn find_catalog_root(
        &self,
        layers: &[Layer],
        scratch_parent: &Path,
        cancel: &CancellationToken,
    ) -> Result<CatalogRoot> {
        for (index, layer) in layers.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled { stage: "layer scan" });
            }

            let mut blob = match self.source.open_blob(layer) {
                Ok(blob) => blob,
                Err(e) => {
                    warn!(index, digest = %layer.digest, error = %e, "Skipping layer, blob unavailable");
                    continue;
                }
            };

            let dir = tempfile::Builder::new()
                .prefix("layer-")
                .tempdir_in(scratch_parent)
                .map_err(|e| {
                    Error::extraction_failed(
                        scratch_parent,
                        format!("failed to create scratch directory: {e}"),
                    )
                })?;

            if let Err(e) = self.extractor.extract(&mut blob, dir.path()) {
                warn!(index, digest = %layer.digest, error = %e, "Skipping layer, extraction failed");
                continue;
            }

            if dir.path().join(CATALOG_MARKER).is_dir() {
                info!(index, digest = %layer.digest, "Found catalog root");
                return Ok(CatalogRoot {
                    dir,
                    layer_index: index,
                    layer_digest: layer.digest.clone(),
                });
            }

            debug!(index, digest = %layer.digest, "Layer has no catalog root");
        }

        Err(Error::NoCatalogFound {
            layers: layers.len(),
        })
    }
}
