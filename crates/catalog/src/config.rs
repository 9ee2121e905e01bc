//! Runtime settings.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Repositories probed when listing the catalogs available for a version.
pub const DEFAULT_CANDIDATES: [&str; 4] = [
    "registry.redhat.io/redhat/redhat-operator-index",
    "registry.redhat.io/redhat/certified-operator-index",
    "registry.redhat.io/redhat/community-operator-index",
    "registry.redhat.io/redhat/redhat-marketplace-index",
];

/// Settings shared by the resolver, prober and registry backend.
///
/// Every field has a default, so an empty TOML document is valid:
///
/// ```toml
/// working_dir = "working-dir"
/// scratch_dir = "/var/tmp"
/// candidates = ["quay.io/org/index"]
/// insecure_registries = ["localhost:5000"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Root under which `operator-catalogs/` is kept.
    pub working_dir: PathBuf,
    /// Parent directory for scratch areas; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Repository templates probed by version.
    pub candidates: Vec<String>,
    /// Registries reached over plain HTTP.
    pub insecure_registries: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("working-dir"),
            scratch_dir: None,
            candidates: DEFAULT_CANDIDATES.iter().map(ToString::to_string).collect(),
            insecure_registries: Vec::new(),
        }
    }
}

impl Settings {
    /// Parse settings from a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Directory holding every cache entry.
    #[must_use]
    pub fn cache_root(&self) -> PathBuf {
        self.working_dir.join("operator-catalogs")
    }

    /// Parent directory for scratch areas.
    #[must_use]
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
