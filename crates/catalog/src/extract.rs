//! Unpacking of layer archives.
//!
//! Layers may be plain tar, gzip-compressed tar or zstd-compressed tar.
//! The format is sniffed from the leading bytes, which are then replayed
//! in front of the rest of the stream.

use std::fs::{self, OpenOptions};
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tar::{Archive, EntryType};
use tracing::{debug, trace};

use crate::{Error, Result};

/// Number of bytes inspected to detect a compression envelope.
const SNIFF_LEN: u64 = 512;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Unpacks an archive stream into a directory.
pub trait ArchiveExtractor: Send + Sync {
    /// Extract everything in `stream` under `dest`.
    fn extract(&self, stream: &mut dyn Read, dest: &Path) -> Result<()>;
}

/// Compression envelope detected on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain tar.
    None,
    /// gzip.
    Gzip,
    /// zstd.
    Zstd,
}

impl Compression {
    /// Detect the envelope from the first bytes of a stream.
    #[must_use]
    pub fn sniff(prefix: &[u8]) -> Self {
        if prefix.starts_with(&GZIP_MAGIC) {
            Self::Gzip
        } else if prefix.starts_with(&ZSTD_MAGIC) {
            Self::Zstd
        } else {
            Self::None
        }
    }
}

/// Tar extractor writing directories and regular files only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarExtractor;

impl ArchiveExtractor for TarExtractor {
    fn extract(&self, stream: &mut dyn Read, dest: &Path) -> Result<()> {
        let mut prefix = Vec::with_capacity(SNIFF_LEN as usize);
        (&mut *stream)
            .take(SNIFF_LEN)
            .read_to_end(&mut prefix)
            .map_err(|e| Error::extraction_failed(dest, e.to_string()))?;

        let compression = Compression::sniff(&prefix);
        debug!(?compression, dest = %dest.display(), "Extracting archive");

        let replayed = Cursor::new(prefix).chain(stream);
        match compression {
            Compression::Gzip => unpack(MultiGzDecoder::new(replayed), dest),
            Compression::Zstd => {
                let decoder = zstd::stream::read::Decoder::new(replayed)
                    .map_err(|e| Error::extraction_failed(dest, e.to_string()))?;
                unpack(decoder, dest)
            }
            Compression::None => unpack(replayed, dest),
        }
    }
}

fn unpack<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| Error::extraction_failed(dest, e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::extraction_failed(dest, e.to_string()))?;
        let raw_path = entry
            .path()
            .map_err(|e| Error::extraction_failed(dest, e.to_string()))?
            .into_owned();

        let Some(relative) = normalize_entry_path(&raw_path) else {
            return Err(Error::extraction_failed(
                dest,
                format!("entry {} escapes the destination", raw_path.display()),
            ));
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(&relative);
        let io_err =
            |e: io::Error| Error::extraction_failed(dest, format!("{}: {e}", target.display()));

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(io_err)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(io_err)?;
                }
                let mode = entry.header().mode().unwrap_or(0o644) & 0o7777;
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&target)
                    .map_err(io_err)?;
                io::copy(&mut entry, &mut file).map_err(io_err)?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                        .map_err(io_err)?;
                }
                #[cfg(not(unix))]
                let _ = mode;
            }
            other => {
                trace!(path = %relative.display(), entry_type = ?other, "Skipping entry");
            }
        }
    }

    Ok(())
}

/// Strip root and `.` components; `None` if the path climbs out with `..`.
fn normalize_entry_path(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => return None,
        }
    }
    Some(normalized)
}
