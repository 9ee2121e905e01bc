//! Operator catalog resolution for lumen.
//!
//! This crate provides functionality to:
//! - Resolve catalog image references to content-addressed digests
//! - Find and extract the file-based catalog inside an image's layers
//! - Cache extracted catalogs by digest under `<working_dir>/operator-catalogs`
//! - Probe candidate repositories for the catalogs published for a version
//! - List packages, channels and versions of a catalog
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lumen_catalog::{ListOptions, Lister, OciRegistryBackend, Settings};
//! use tokio_util::sync::CancellationToken;
//!
//! let settings = Settings::default();
//! let backend = Arc::new(OciRegistryBackend::new(&settings.insecure_registries));
//! let lister = Lister::from_settings(&settings, backend);
//!
//! let opts = ListOptions {
//!     catalog: Some("registry.redhat.io/redhat/redhat-operator-index:v4.16".into()),
//!     ..ListOptions::default()
//! };
//! let results = lister.list(&opts, &CancellationToken::new()).await?;
//! ```

#![warn(missing_docs)]

mod backend;
mod cache;
mod config;
mod declcfg;
mod error;
mod extract;
mod layout;
mod list;
mod model;
mod probe;
mod query;
mod registry;
mod resolver;
mod scan;

pub use backend::{BlobSource, ImageBackend};
pub use cache::{CacheKey, CacheLock, CatalogCache, Lookup};
pub use config::{DEFAULT_CANDIDATES, Settings};
pub use declcfg::{CatalogLoader, DeclarativeConfigLoader};
pub use error::{Error, ErrorCategory, Result};
pub use extract::{ArchiveExtractor, Compression, TarExtractor};
pub use layout::{Descriptor, LayoutWriter, MANIFEST_MEDIA_TYPE, OciLayout, sha256_digest};
pub use list::{ListOptions, ListResults, Lister};
pub use model::{
    Bundle, CATALOG_MARKER, Channel, ChannelEntry, ContentDigest, ImageIdentity, Layer, Package,
    ParsedCatalog,
};
pub use probe::CandidateProber;
pub use query::{ChannelHead, PackageSummary, list_channels, list_packages, list_versions};
pub use registry::OciRegistryBackend;
pub use resolver::CatalogResolver;
pub use scan::{CatalogRoot, LayerScanner};
