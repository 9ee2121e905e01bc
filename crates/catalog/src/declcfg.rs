//! Loading of file-based catalogs (declarative configs).
//!
//! A catalog directory holds any number of `.json`, `.yaml` or `.yml`
//! files, each a stream of objects tagged with a `schema` field.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::model::{Bundle, Channel, Package, ParsedCatalog};
use crate::{Error, Result};

/// Schema tag for packages.
pub const SCHEMA_PACKAGE: &str = "olm.package";
/// Schema tag for channels.
pub const SCHEMA_CHANNEL: &str = "olm.channel";
/// Schema tag for bundles.
pub const SCHEMA_BUNDLE: &str = "olm.bundle";

/// Parses a catalog directory into a [`ParsedCatalog`].
pub trait CatalogLoader: Send + Sync {
    /// Load every catalog file under `dir`.
    fn load(&self, dir: &Path) -> Result<ParsedCatalog>;
}

/// Loader for the OLM file-based catalog format.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarativeConfigLoader;

impl CatalogLoader for DeclarativeConfigLoader {
    fn load(&self, dir: &Path) -> Result<ParsedCatalog> {
        if !dir.is_dir() {
            return Err(Error::parse(dir, "not a directory"));
        }

        let mut catalog = ParsedCatalog::default();
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

        for entry in walker {
            let entry = entry.map_err(|e| Error::parse(dir, e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(format) = FileFormat::from_path(path) else {
                trace!(path = %path.display(), "Ignoring non-catalog file");
                continue;
            };
            for object in format.read(path)? {
                add_object(&mut catalog, object, path)?;
            }
        }

        debug!(
            dir = %dir.display(),
            packages = catalog.packages.len(),
            channels = catalog.channels.len(),
            bundles = catalog.bundles.len(),
            "Loaded declarative config"
        );
        Ok(catalog)
    }
}

#[derive(Debug, Clone, Copy)]
enum FileFormat {
    Json,
    Yaml,
}

impl FileFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    fn read(self, path: &Path) -> Result<Vec<Value>> {
        let file = File::open(path).map_err(|e| Error::parse(path, e.to_string()))?;
        let reader = BufReader::new(file);
        match self {
            Self::Json => serde_json::Deserializer::from_reader(reader)
                .into_iter::<Value>()
                .map(|v| v.map_err(|e| Error::parse(path, e.to_string())))
                .collect(),
            Self::Yaml => {
                let mut objects = Vec::new();
                for document in serde_yaml::Deserializer::from_reader(reader) {
                    let value = Value::deserialize(document)
                        .map_err(|e| Error::parse(path, e.to_string()))?;
                    if !value.is_null() {
                        objects.push(value);
                    }
                }
                Ok(objects)
            }
        }
    }
}

fn add_object(catalog: &mut ParsedCatalog, object: Value, path: &Path) -> Result<()> {
    let schema = object
        .get("schema")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::parse(path, "object is missing a schema"))?;

    match schema {
        SCHEMA_PACKAGE => catalog.packages.push(decode::<Package>(object, path)?),
        SCHEMA_CHANNEL => catalog.channels.push(decode::<Channel>(object, path)?),
        SCHEMA_BUNDLE => catalog.bundles.push(decode::<Bundle>(object, path)?),
        other => trace!(schema = other, "Ignoring object with unhandled schema"),
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(object: Value, path: &Path) -> Result<T> {
    serde_json::from_value(object).map_err(|e| Error::parse(path, e.to_string()))
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}
