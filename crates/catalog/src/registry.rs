//! Registry-backed [`ImageBackend`].
//!
//! Uses `oci-distribution` for registry operations.

use std::path::Path;

use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, trace};

use crate::backend::ImageBackend;
use crate::layout::LayoutWriter;
use crate::model::{ContentDigest, ImageIdentity};
use crate::{Error, Result};

/// OCI registry client implementing identity resolution and layout fetches.
pub struct OciRegistryBackend {
    client: Client,
}

impl Default for OciRegistryBackend {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl OciRegistryBackend {
    /// Create a backend. Registries in `insecure` are reached over plain HTTP.
    #[must_use]
    pub fn new(insecure: &[String]) -> Self {
        let config = ClientConfig {
            protocol: client_protocol(insecure),
            ..Default::default()
        };
        Self {
            client: Client::new(config),
        }
    }

    /// Pull one blob into `dest` and verify its digest.
    async fn pull_blob(
        &self,
        reference: &Reference,
        descriptor: &OciDescriptor,
        dest: &Path,
    ) -> Result<()> {
        debug!(digest = %descriptor.digest, dest = %dest.display(), "Pulling blob");

        let mut file = tokio::fs::File::create(dest).await?;
        self.client
            .pull_blob(reference, descriptor, &mut file)
            .await
            .map_err(|e| Error::blob_pull_failed(&descriptor.digest, e.to_string()))?;
        file.flush().await?;

        if descriptor.digest.starts_with("sha256:") {
            let computed = compute_file_digest(dest).await?;
            if computed != descriptor.digest {
                tokio::fs::remove_file(dest).await.ok();
                return Err(Error::digest_mismatch(&descriptor.digest, &computed));
            }
        }

        trace!(digest = %descriptor.digest, "Pulled and verified blob");
        Ok(())
    }
}

fn client_protocol(insecure: &[String]) -> ClientProtocol {
    if insecure.is_empty() {
        ClientProtocol::Https
    } else {
        ClientProtocol::HttpsExcept(insecure.to_vec())
    }
}

#[async_trait]
impl ImageBackend for OciRegistryBackend {
    async fn resolve_identity(&self, image_ref: &str) -> Result<ImageIdentity> {
        let reference = parse_reference(image_ref)?;
        debug!(image = %image_ref, "Retrieving remote information");

        let digest = self
            .client
            .fetch_manifest_digest(&reference, &RegistryAuth::Anonymous)
            .await
            .map_err(|e| Error::remote_info(image_ref, e.to_string()))?;

        let identity = ImageIdentity {
            repository: format!("{}/{}", reference.registry(), reference.repository()),
            tag: reference.tag().unwrap_or_default().to_string(),
            digest: ContentDigest::new(digest),
        };
        debug!(
            image = %image_ref,
            repository = %identity.repository,
            tag = %identity.tag,
            digest = %identity.digest,
            "Resolved image identity"
        );
        Ok(identity)
    }

    async fn fetch_layout(&self, image_ref: &str, dest: &Path) -> Result<()> {
        let reference = parse_reference(image_ref)?;
        info!(image = %image_ref, "Pulling image from registry");

        let (manifest, digest) = self
            .client
            .pull_image_manifest(&reference, &RegistryAuth::Anonymous)
            .await
            .map_err(|e| Error::fetch(image_ref, e.to_string()))?;
        trace!(?manifest, %digest, "Got manifest");

        let writer = LayoutWriter::create(dest)?;
        let descriptors = std::iter::once(&manifest.config).chain(manifest.layers.iter());
        for descriptor in descriptors {
            let path = writer.blob_path(&descriptor.digest)?;
            self.pull_blob(&reference, descriptor, &path)
                .await
                .map_err(|e| Error::fetch(image_ref, e.to_string()))?;
        }
        writer.finish(&serde_json::to_vec(&manifest)?)?;

        info!(
            image = %image_ref,
            layer_count = manifest.layers.len(),
            "Pulled image into OCI layout"
        );
        Ok(())
    }
}

/// Parse an image reference string.
fn parse_reference(image: &str) -> Result<Reference> {
    image
        .parse()
        .map_err(|e: oci_distribution::ParseError| Error::invalid_reference(image, e.to_string()))
}

/// Compute the SHA256 digest of a file.
///
/// Returns the digest in OCI format: `sha256:<hex>`.
async fn compute_file_digest(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}
