//! Capability traits the pipeline depends on.
//!
//! The resolver and prober only see these traits, so tests substitute
//! in-memory fakes for the registry.

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;

use crate::Result;
use crate::model::{ImageIdentity, Layer};

/// Remote image operations.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Resolve a (possibly tag-based) reference to its repository, tag and digest.
    async fn resolve_identity(&self, image_ref: &str) -> Result<ImageIdentity>;

    /// Copy the image into an OCI image layout at `dest`.
    ///
    /// Callers pass a digest-pinned reference (`<repository>@<digest>`).
    async fn fetch_layout(&self, image_ref: &str, dest: &Path) -> Result<()>;
}

/// Source of layer blob streams.
pub trait BlobSource: Send + Sync {
    /// Open the raw (possibly compressed) blob for `layer`.
    fn open_blob(&self, layer: &Layer) -> Result<Box<dyn Read + Send>>;
}
