//! OCI image layout on local disk.
//!
//! Structure:
//! ```text
//! <root>/
//! ├── oci-layout        # {"imageLayoutVersion":"1.0.0"}
//! ├── index.json        # points at the manifest blob
//! └── blobs/
//!     └── sha256/
//!         └── abc123... # manifest, config and layer blobs
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::backend::BlobSource;
use crate::model::Layer;
use crate::{Error, Result};

/// Media type of an OCI image manifest.
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

const LAYOUT_FILE: &str = "oci-layout";
const INDEX_FILE: &str = "index.json";
const LAYOUT_VERSION: &str = "1.0.0";

/// Content descriptor as it appears in `index.json` and manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    #[serde(default)]
    pub media_type: String,
    /// Content digest.
    pub digest: String,
    /// Size in bytes.
    pub size: i64,
    /// Optional annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

impl From<Descriptor> for Layer {
    fn from(d: Descriptor) -> Self {
        Self {
            digest: d.digest,
            size: d.size,
            media_type: d.media_type,
            annotations: d.annotations.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageIndex {
    schema_version: u32,
    #[serde(default)]
    manifests: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct ManifestLayers {
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutMarker {
    image_layout_version: String,
}

/// Read side of an OCI image layout holding a single image.
#[derive(Debug, Clone)]
pub struct OciLayout {
    root: PathBuf,
    layers: Vec<Layer>,
}

impl OciLayout {
    /// Open the layout at `root` and load the layer list of its first manifest.
    pub fn open(root: &Path) -> Result<Self> {
        let index_path = root.join(INDEX_FILE);
        let raw = std::fs::read(&index_path)
            .map_err(|e| Error::layout(root, format!("failed to read {INDEX_FILE}: {e}")))?;
        let index: ImageIndex = serde_json::from_slice(&raw)
            .map_err(|e| Error::layout(root, format!("failed to parse {INDEX_FILE}: {e}")))?;

        let Some(manifest) = index.manifests.first() else {
            return Err(Error::layout(root, "index lists no manifests"));
        };

        let manifest_path = blob_path(root, &manifest.digest)?;
        let raw = std::fs::read(&manifest_path).map_err(|e| {
            Error::layout(root, format!("failed to read manifest {}: {e}", manifest.digest))
        })?;
        let manifest: ManifestLayers = serde_json::from_slice(&raw)
            .map_err(|e| Error::layout(root, format!("failed to parse manifest: {e}")))?;

        let layers: Vec<Layer> = manifest.layers.into_iter().map(Layer::from).collect();
        debug!(root = %root.display(), layer_count = layers.len(), "Opened OCI layout");

        Ok(Self {
            root: root.to_path_buf(),
            layers,
        })
    }

    /// Layers in manifest order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Layout root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BlobSource for OciLayout {
    fn open_blob(&self, layer: &Layer) -> Result<Box<dyn Read + Send>> {
        let path = blob_path(&self.root, &layer.digest)?;
        trace!(digest = %layer.digest, path = %path.display(), "Opening layer blob");
        let file = File::open(&path)
            .map_err(|e| Error::blob_pull_failed(&layer.digest, e.to_string()))?;
        Ok(Box::new(file))
    }
}

/// Write side of an OCI image layout.
#[derive(Debug)]
pub struct LayoutWriter {
    root: PathBuf,
}

impl LayoutWriter {
    /// Initialise an empty layout at `root`.
    pub fn create(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root.join("blobs"))?;
        let marker = LayoutMarker {
            image_layout_version: LAYOUT_VERSION.to_string(),
        };
        std::fs::write(root.join(LAYOUT_FILE), serde_json::to_vec(&marker)?)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Path a blob with `digest` is stored at. Parent directories are created.
    pub fn blob_path(&self, digest: &str) -> Result<PathBuf> {
        let path = blob_path(&self.root, digest)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    /// Store `bytes` as a sha256-addressed blob and return its digest.
    pub fn write_blob(&self, bytes: &[u8]) -> Result<String> {
        let digest = sha256_digest(bytes);
        std::fs::write(self.blob_path(&digest)?, bytes)?;
        Ok(digest)
    }

    /// Store the manifest and point `index.json` at it.
    pub fn finish(self, manifest: &[u8]) -> Result<()> {
        let digest = self.write_blob(manifest)?;
        let size = i64::try_from(manifest.len())
            .map_err(|e| Error::layout(&self.root, e.to_string()))?;
        let index = ImageIndex {
            schema_version: 2,
            manifests: vec![Descriptor {
                media_type: MANIFEST_MEDIA_TYPE.to_string(),
                digest,
                size,
                annotations: None,
            }],
        };
        std::fs::write(self.root.join(INDEX_FILE), serde_json::to_vec(&index)?)?;
        Ok(())
    }
}

/// Compute the OCI digest (`sha256:<hex>`) of `bytes`.
#[must_use]
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Map a digest to `blobs/<algorithm>/<encoded>`, rejecting anything that
/// would leave the blobs directory.
fn blob_path(root: &Path, digest: &str) -> Result<PathBuf> {
    let (algo, encoded) = digest
        .split_once(':')
        .ok_or_else(|| Error::layout(root, format!("malformed digest '{digest}'")))?;
    let valid = |s: &str| {
        !s.is_empty()
            && s != "."
            && s != ".."
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '_' | '-'))
    };
    if !valid(algo) || !valid(encoded) {
        return Err(Error::layout(root, format!("malformed digest '{digest}'")));
    }
    Ok(root.join("blobs").join(algo).join(encoded))
}
