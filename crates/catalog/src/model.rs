//! Image identities, layers and the parsed catalog model.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the directory that marks the root of a file-based catalog
/// inside an extracted layer.
pub const CATALOG_MARKER: &str = "configs";

/// Opaque content hash such as `sha256:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Wrap a digest string as returned by the registry.
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// The digest exactly as the registry reported it.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(algorithm, encoded)`, defaulting the algorithm to sha256.
    #[must_use]
    pub fn parts(&self) -> (&str, &str) {
        self.0.split_once(':').unwrap_or(("sha256", &self.0))
    }

    /// Filesystem-safe form used as a cache path segment.
    ///
    /// Only the first `:` is replaced, which keeps the layout of caches
    /// written by earlier releases.
    #[must_use]
    pub fn path_token(&self) -> String {
        self.0.replacen(':', "-", 1)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote identity of an image, produced once per resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageIdentity {
    /// Fully qualified repository name, e.g. `registry.redhat.io/redhat/redhat-operator-index`.
    pub repository: String,
    /// Tag the reference carried; empty when referenced by digest.
    pub tag: String,
    /// Manifest digest. The only value trusted for caching and fetching.
    pub digest: ContentDigest,
}

impl ImageIdentity {
    /// Reference pinned to the resolved digest, `<repository>@<digest>`.
    #[must_use]
    pub fn pinned_reference(&self) -> String {
        format!("{}@{}", self.repository, self.digest)
    }
}

/// One content-addressed layer of an image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Layer {
    /// Blob digest.
    pub digest: String,
    /// Blob size in bytes.
    pub size: i64,
    /// Media type as declared in the manifest.
    pub media_type: String,
    /// Optional annotations.
    pub annotations: HashMap<String, String>,
}

/// A package (operator) declared with `schema: olm.package`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    /// Package name.
    pub name: String,
    /// Channel used when none is requested.
    #[serde(default)]
    pub default_channel: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An update channel declared with `schema: olm.channel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel name.
    pub name: String,
    /// Owning package.
    pub package: String,
    /// Bundle entries in declaration order.
    #[serde(default)]
    pub entries: Vec<ChannelEntry>,
}

/// A bundle version listed in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    /// Bundle name.
    pub name: String,
    /// Entry this one upgrades from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
    /// Entries this one may skip over.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skips: Vec<String>,
    /// Semver range of versions this one replaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_range: Option<String>,
}

impl ChannelEntry {
    /// Entry with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replaces: None,
            skips: Vec::new(),
            skip_range: None,
        }
    }
}

/// A bundle declared with `schema: olm.bundle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Bundle name.
    pub name: String,
    /// Owning package.
    pub package: String,
    /// Bundle image reference.
    #[serde(default)]
    pub image: String,
}

/// Normalized content of a file-based catalog.
///
/// Loaded fresh from the cache directory on every resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCatalog {
    /// Packages in load order.
    pub packages: Vec<Package>,
    /// Channels in load order.
    pub channels: Vec<Channel>,
    /// Bundles in load order.
    pub bundles: Vec<Bundle>,
}
