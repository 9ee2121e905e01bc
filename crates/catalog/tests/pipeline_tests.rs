//! End-to-end tests of resolution, caching and listing against an
//! in-memory registry that writes real OCI layouts.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use lumen_catalog::{
    CatalogCache, CatalogResolver, ContentDigest, Error, ImageBackend, ImageIdentity,
    LayoutWriter, ListOptions, Lister, MANIFEST_MEDIA_TYPE, Result, Settings, sha256_digest,
};
use tar::{Builder, Header};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const CATALOG_YAML: &str = r"---
schema: olm.package
name: pkg1
defaultChannel: stable
---
schema: olm.channel
name: stable
package: pkg1
entries:
  - name: v1.0.0
  - name: v1.1.0
    replaces: v1.0.0
---
schema: olm.package
name: pkg2
defaultChannel: beta
---
schema: olm.channel
name: beta
package: pkg2
entries:
  - name: v2.0.0
";

enum FakeLayer {
    Blob(Vec<u8>),
    Missing,
}

struct FakeImage {
    digest: String,
    layers: Vec<FakeLayer>,
}

/// Registry keyed by `<repository>:<tag>`.
#[derive(Default)]
struct FakeRegistry {
    images: Mutex<HashMap<String, Arc<FakeImage>>>,
    resolve_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl FakeRegistry {
    fn push(&self, repository: &str, tag: &str, layers: Vec<FakeLayer>) -> String {
        let generation = self.images.lock().unwrap().len();
        let digest = sha256_digest(format!("{repository}:{tag}:{generation}").as_bytes());
        let image = FakeImage {
            digest: digest.clone(),
            layers,
        };
        self.images
            .lock()
            .unwrap()
            .insert(format!("{repository}:{tag}"), Arc::new(image));
        digest
    }

    fn find_pinned(&self, pinned: &str) -> Option<Arc<FakeImage>> {
        let (repository, digest) = pinned.split_once('@')?;
        self.images
            .lock()
            .unwrap()
            .iter()
            .find(|(key, image)| key.starts_with(&format!("{repository}:")) && image.digest == digest)
            .map(|(_, image)| Arc::clone(image))
    }

    fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageBackend for FakeRegistry {
    async fn resolve_identity(&self, image_ref: &str) -> Result<ImageIdentity> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let image = self
            .images
            .lock()
            .unwrap()
            .get(image_ref)
            .cloned()
            .ok_or_else(|| Error::remote_info(image_ref, "manifest unknown"))?;
        let (repository, tag) = image_ref.rsplit_once(':').unwrap();
        Ok(ImageIdentity {
            repository: repository.to_string(),
            tag: tag.to_string(),
            digest: ContentDigest::new(&image.digest),
        })
    }

    async fn fetch_layout(&self, image_ref: &str, dest: &Path) -> Result<()> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(image_ref.to_string());
        let image = self
            .find_pinned(image_ref)
            .ok_or_else(|| Error::fetch(image_ref, "not pinned to a known digest"))?;

        let writer = LayoutWriter::create(dest)?;
        let mut descriptors = Vec::new();
        for (index, layer) in image.layers.iter().enumerate() {
            let (digest, size) = match layer {
                FakeLayer::Blob(bytes) => (writer.write_blob(bytes)?, bytes.len()),
                FakeLayer::Missing => (sha256_digest(format!("missing-{index}").as_bytes()), 0),
            };
            descriptors.push(serde_json::json!({
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "digest": digest,
                "size": size,
            }));
        }
        let config = writer.write_blob(b"{}")?;
        let manifest = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": MANIFEST_MEDIA_TYPE,
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": config,
                "size": 2,
            },
            "layers": descriptors,
        });
        writer.finish(&serde_json::to_vec(&manifest)?)
    }
}

fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    for (path, content) in files {
        let mut header = Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, content.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap()
}

fn gzipped(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn catalog_layer() -> FakeLayer {
    FakeLayer::Blob(gzipped(&tarball(&[(
        "configs/pkg1/catalog.yaml",
        CATALOG_YAML,
    )])))
}

fn base_layer() -> FakeLayer {
    FakeLayer::Blob(tarball(&[("bin/opm", "#!/bin/sh\n"), ("etc/os-release", "ID=ubi\n")]))
}

struct Harness {
    temp: TempDir,
    registry: Arc<FakeRegistry>,
}

impl Harness {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
            registry: Arc::new(FakeRegistry::default()),
        }
    }

    fn settings(&self) -> Settings {
        Settings {
            working_dir: self.temp.path().join("working-dir"),
            scratch_dir: Some(self.temp.path().join("scratch")),
            candidates: ["A", "B", "C", "D"].iter().map(ToString::to_string).collect(),
            insecure_registries: Vec::new(),
        }
    }

    fn resolver(&self) -> CatalogResolver {
        let settings = self.settings();
        CatalogResolver::new(
            self.registry.clone(),
            Arc::new(CatalogCache::new(settings.cache_root())),
            settings.scratch_root(),
        )
    }

    fn lister(&self) -> Lister {
        Lister::from_settings(&self.settings(), self.registry.clone())
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.temp.path().join("scratch"))
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}

#[tokio::test]
async fn second_resolution_hits_cache() {
    let h = Harness::new();
    h.registry
        .push("quay.io/org/index", "v1", vec![base_layer(), catalog_layer()]);
    let resolver = h.resolver();
    let cancel = CancellationToken::new();

    let first = resolver.resolve("quay.io/org/index:v1", &cancel).await.unwrap();
    let second = resolver.resolve("quay.io/org/index:v1", &cancel).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.packages.len(), 2);
    assert_eq!(h.registry.fetch_calls(), 1);
    assert_eq!(h.registry.resolve_calls.load(Ordering::SeqCst), 2);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn fetch_is_pinned_to_resolved_digest() {
    let h = Harness::new();
    let digest = h
        .registry
        .push("quay.io/org/index", "v1", vec![catalog_layer()]);

    h.resolver()
        .resolve("quay.io/org/index:v1", &CancellationToken::new())
        .await
        .unwrap();

    let fetched = h.registry.fetched.lock().unwrap().clone();
    assert_eq!(fetched, vec![format!("quay.io/org/index@{digest}")]);
}

#[tokio::test]
async fn cache_entry_has_expected_path() {
    let h = Harness::new();
    let digest = h
        .registry
        .push("quay.io/org/index", "v1", vec![catalog_layer()]);

    h.resolver()
        .resolve("quay.io/org/index:v1", &CancellationToken::new())
        .await
        .unwrap();

    let token = digest.replacen(':', "-", 1);
    let entry = h
        .temp
        .path()
        .join("working-dir/operator-catalogs/quay.io/org/index/v1")
        .join(&token)
        .join("configs");
    assert!(!token.contains(':'));
    assert_eq!(
        std::fs::read_to_string(entry.join("pkg1/catalog.yaml")).unwrap(),
        CATALOG_YAML
    );
}

#[tokio::test]
async fn first_layer_with_catalog_wins() {
    let h = Harness::new();
    let partial = FakeLayer::Blob(tarball(&[(
        "configs/only/catalog.yaml",
        "schema: olm.package\nname: only\n",
    )]));
    h.registry
        .push("quay.io/org/index", "v1", vec![partial, catalog_layer()]);

    let catalog = h
        .resolver()
        .resolve("quay.io/org/index:v1", &CancellationToken::new())
        .await
        .unwrap();

    let names: Vec<&str> = catalog.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["only"]);
}

#[tokio::test]
async fn missing_layer_blob_is_skipped() {
    let h = Harness::new();
    h.registry.push(
        "quay.io/org/index",
        "v1",
        vec![FakeLayer::Missing, base_layer(), catalog_layer()],
    );

    let catalog = h
        .resolver()
        .resolve("quay.io/org/index:v1", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(catalog.channels.len(), 2);
}

#[tokio::test]
async fn corrupt_layer_is_skipped() {
    let h = Harness::new();
    h.registry.push(
        "quay.io/org/index",
        "v1",
        vec![FakeLayer::Blob(vec![0x1f, 0x8b, 0xff, 0xff, 0, 0, 0, 0]), catalog_layer()],
    );

    let catalog = h
        .resolver()
        .resolve("quay.io/org/index:v1", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(catalog.packages[0].name, "pkg1");
}

#[tokio::test]
async fn image_without_catalog_is_not_cached() {
    let h = Harness::new();
    h.registry
        .push("quay.io/org/index", "v1", vec![base_layer(), base_layer()]);

    let err = h
        .resolver()
        .resolve("quay.io/org/index:v1", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "no valid catalog found in any layer (2 scanned)"
    );
    assert!(!h.temp.path().join("working-dir/operator-catalogs/quay.io").exists());
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn retagged_image_is_fetched_again() {
    let h = Harness::new();
    let resolver = h.resolver();
    let cancel = CancellationToken::new();

    let old = h
        .registry
        .push("quay.io/org/index", "v1", vec![catalog_layer()]);
    resolver.resolve("quay.io/org/index:v1", &cancel).await.unwrap();

    let new = h.registry.push(
        "quay.io/org/index",
        "v1",
        vec![FakeLayer::Blob(tarball(&[(
            "configs/pkg3/catalog.yaml",
            "schema: olm.package\nname: pkg3\n",
        )]))],
    );
    let catalog = resolver.resolve("quay.io/org/index:v1", &cancel).await.unwrap();

    assert_ne!(old, new);
    assert_eq!(h.registry.fetch_calls(), 2);
    assert_eq!(catalog.packages[0].name, "pkg3");
}

#[tokio::test]
async fn concurrent_resolutions_fetch_once() {
    let h = Harness::new();
    h.registry
        .push("quay.io/org/index", "v1", vec![base_layer(), catalog_layer()]);
    let resolver = h.resolver();
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(
        resolver.resolve("quay.io/org/index:v1", &cancel),
        resolver.resolve("quay.io/org/index:v1", &cancel),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(h.registry.fetch_calls(), 1);
}

#[tokio::test]
async fn list_packages_channels_and_bundles() {
    let h = Harness::new();
    h.registry
        .push("quay.io/org/index", "v1", vec![catalog_layer()]);
    let lister = h.lister();
    let cancel = CancellationToken::new();
    let catalog = Some("quay.io/org/index:v1".to_string());

    let packages = lister
        .list(
            &ListOptions {
                catalog: catalog.clone(),
                ..ListOptions::default()
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(&packages).unwrap(),
        serde_json::json!({"packages": [
            {"name": "pkg1", "defaultChannel": "stable"},
            {"name": "pkg2", "defaultChannel": "beta"},
        ]})
    );

    let channels = lister
        .list(
            &ListOptions {
                catalog: catalog.clone(),
                package: Some("pkg1".to_string()),
                ..ListOptions::default()
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(channels.channels.len(), 1);
    assert_eq!(channels.channels[0].head, "v1.1.0");

    let versions = lister
        .list(
            &ListOptions {
                catalog: catalog.clone(),
                package: Some("pkg1".to_string()),
                channel: Some("stable".to_string()),
                ..ListOptions::default()
            },
            &cancel,
        )
        .await
        .unwrap();
    let names: Vec<&str> = versions.versions.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["v1.0.0", "v1.1.0"]);

    let err = lister
        .list(
            &ListOptions {
                catalog,
                package: Some("pkg9".to_string()),
                ..ListOptions::default()
            },
            &cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), r#"package "pkg9" not found in catalog"#);

    assert_eq!(h.registry.fetch_calls(), 1);
}

#[tokio::test]
async fn channel_without_package_lists_packages() {
    let h = Harness::new();
    h.registry
        .push("quay.io/org/index", "v1", vec![catalog_layer()]);

    let results = h
        .lister()
        .list(
            &ListOptions {
                catalog: Some("quay.io/org/index:v1".to_string()),
                channel: Some("stable".to_string()),
                ..ListOptions::default()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let names: Vec<_> = results.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["pkg1", "pkg2"]);
    assert!(results.channels.is_empty());
    assert!(results.versions.is_empty());
}

#[tokio::test]
async fn list_catalogs_probes_every_candidate() {
    let h = Harness::new();
    h.registry.push("A", "v4.16", vec![catalog_layer()]);
    h.registry.push("C", "v4.16", vec![catalog_layer()]);

    let results = h
        .lister()
        .list(
            &ListOptions {
                catalogs: true,
                version: Some("4.16".to_string()),
                ..ListOptions::default()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(results.catalogs, vec!["A:v4.16", "C:v4.16"]);
    assert_eq!(h.registry.resolve_calls.load(Ordering::SeqCst), 4);
    assert_eq!(h.registry.fetch_calls(), 0);
}
