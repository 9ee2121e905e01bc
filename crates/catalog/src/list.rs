//! The `list` operation: catalogs for a version, or packages, channels
//! and versions of one catalog.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::backend::ImageBackend;
use crate::cache::CatalogCache;
use crate::config::Settings;
use crate::model::ChannelEntry;
use crate::probe::CandidateProber;
use crate::query::{self, ChannelHead, PackageSummary};
use crate::resolver::CatalogResolver;
use crate::{Error, Result};

/// What to list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Catalog image reference.
    pub catalog: Option<String>,
    /// List the catalogs published for `version` instead of catalog contents.
    pub catalogs: bool,
    /// Platform version, without the `v` prefix.
    pub version: Option<String>,
    /// Package to list channels (or versions) of.
    pub package: Option<String>,
    /// Channel to list versions of.
    pub channel: Option<String>,
}

/// Output of [`Lister::list`]. Exactly one field is populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListResults {
    /// Packages of the catalog.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageSummary>,
    /// Channels of a package.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelHead>,
    /// Entries of a channel.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<ChannelEntry>,
    /// Catalog references available for a version.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub catalogs: Vec<String>,
}

/// Dispatches [`ListOptions`] to the prober or the resolver and query layer.
pub struct Lister {
    resolver: CatalogResolver,
    prober: CandidateProber,
    candidates: Vec<String>,
}

impl Lister {
    /// Create a lister from its parts.
    #[must_use]
    pub fn new(resolver: CatalogResolver, prober: CandidateProber, candidates: Vec<String>) -> Self {
        Self {
            resolver,
            prober,
            candidates,
        }
    }

    /// Wire a lister over `backend` using the cache and candidates in `settings`.
    #[must_use]
    pub fn from_settings(settings: &Settings, backend: Arc<dyn ImageBackend>) -> Self {
        let cache = Arc::new(CatalogCache::new(settings.cache_root()));
        let resolver = CatalogResolver::new(Arc::clone(&backend), cache, settings.scratch_root());
        Self::new(
            resolver,
            CandidateProber::new(backend),
            settings.candidates.clone(),
        )
    }

    /// Run the listing described by `opts`.
    #[instrument(skip_all)]
    pub async fn list(&self, opts: &ListOptions, cancel: &CancellationToken) -> Result<ListResults> {
        let catalog = opts.catalog.as_deref().filter(|c| !c.is_empty());
        if !opts.catalogs && catalog.is_none() {
            return Err(Error::CatalogRequired);
        }

        let package = opts.package.as_deref().filter(|p| !p.is_empty());
        let channel = opts.channel.as_deref().filter(|c| !c.is_empty());
        let mut results = ListResults::default();

        if opts.catalogs {
            let version = opts.version.as_deref().unwrap_or_default();
            results.catalogs = self.catalogs(version, cancel).await?;
        } else if let Some(catalog) = catalog {
            let parsed = self.resolver.resolve(catalog, cancel).await?;
            match (package, channel) {
                (Some(package), Some(channel)) => {
                    results.versions = query::list_versions(&parsed, package, channel)?;
                }
                (Some(package), None) => {
                    results.channels = query::list_channels(&parsed, package)?;
                }
                // A channel without a package lists packages.
                (None, _) => results.packages = query::list_packages(&parsed),
            }
        } else {
            return Err(Error::InvalidOptions);
        }

        Ok(results)
    }

    /// Catalog references published for `version`, sorted.
    async fn catalogs(&self, version: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        if version.is_empty() {
            return Err(Error::VersionRequired);
        }
        let tag = format!("v{version}");
        debug!(%tag, candidates = self.candidates.len(), "Listing catalogs");

        let mut found = self
            .prober
            .probe(&self.candidates, &tag, cancel)
            .await
            .map_err(|e| match e {
                Error::NoCatalogsForVersion(_) => Error::NoCatalogsForVersion(version.to_string()),
                other => other,
            })?;
        found.sort();
        Ok(found)
    }
}
