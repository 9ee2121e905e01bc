//! Error types for catalog resolution and queries.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
///
/// Callers use this to tell a valid-but-empty query apart from a transport
/// or parse failure, and to choose exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A required argument was missing or malformed.
    InputValidation,
    /// Identity resolution or image fetch failed.
    Remote,
    /// A single archive could not be unpacked.
    Extraction,
    /// No layer of the image contains a catalog.
    Exhaustion,
    /// The catalog content is not a valid declarative config.
    Parse,
    /// The requested package or channel does not exist.
    NotFound,
    /// The on-disk cache could not be read or written.
    Cache,
    /// The operation was cancelled by the caller.
    Cancelled,
    /// Anything else (I/O, task failures).
    Internal,
}

/// Errors that can occur while resolving or querying catalogs.
#[derive(Error, Debug)]
pub enum Error {
    /// No version was supplied where one is required.
    #[error("a version is required when listing catalogs")]
    VersionRequired,

    /// No catalog reference was supplied.
    #[error("catalog reference is required unless listing catalogs")]
    CatalogRequired,

    /// The combination of list options is not meaningful.
    #[error("invalid set of options provided")]
    InvalidOptions,

    /// Failed to parse an image reference.
    #[error("invalid image reference '{0}': {1}")]
    InvalidReference(String, String),

    /// Identity (name, tag, digest) lookup failed.
    #[error("failed to get remote info for {image}: {message}")]
    RemoteInfo {
        /// The image reference.
        image: String,
        /// Error message.
        message: String,
    },

    /// Copying the image to a local layout failed.
    #[error("failed to copy image {image} to oci layout: {message}")]
    Fetch {
        /// The digest-pinned image reference.
        image: String,
        /// Error message.
        message: String,
    },

    /// Failed to pull blob from registry.
    #[error("failed to pull blob {digest}: {message}")]
    BlobPullFailed {
        /// The blob digest.
        digest: String,
        /// Error message.
        message: String,
    },

    /// Digest mismatch after download.
    #[error("digest mismatch for blob: expected {expected}, got {actual}")]
    DigestMismatch {
        /// The expected digest.
        expected: String,
        /// The computed digest.
        actual: String,
    },

    /// The local OCI layout is missing or malformed.
    #[error("invalid oci layout at {}: {message}", path.display())]
    Layout {
        /// Layout directory.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// An archive could not be unpacked.
    #[error("failed to extract archive into {}: {message}", dest.display())]
    ExtractionFailed {
        /// Destination directory.
        dest: PathBuf,
        /// Error message.
        message: String,
    },

    /// No layer contained the catalog marker directory.
    #[error("no valid catalog found in any layer ({layers} scanned)")]
    NoCatalogFound {
        /// Number of layers examined.
        layers: usize,
    },

    /// Cache directory operation failed.
    #[error("cache error at {}: {message}", path.display())]
    Cache {
        /// The offending path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// The declarative config could not be loaded.
    #[error("failed to load declarative config from {}: {message}", path.display())]
    Parse {
        /// File or directory being parsed.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Package has no channels in the catalog.
    #[error("package {0:?} not found in catalog")]
    PackageNotFound(String),

    /// No channel matches both package and channel name.
    #[error("channel {channel:?} for package {package:?} not found")]
    ChannelNotFound {
        /// Package name.
        package: String,
        /// Channel name.
        channel: String,
    },

    /// No candidate repository hosts a catalog for the version.
    #[error("no catalogs found for version {0}")]
    NoCatalogsForVersion(String),

    /// The operation was cancelled through its token.
    #[error("operation cancelled during {stage}")]
    Cancelled {
        /// Pipeline stage that observed the cancellation.
        stage: &'static str,
    },

    /// Settings could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid reference error.
    #[must_use]
    pub fn invalid_reference(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidReference(reference.into(), message.into())
    }

    /// Create a remote info error.
    #[must_use]
    pub fn remote_info(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteInfo {
            image: image.into(),
            message: message.into(),
        }
    }

    /// Create a fetch error.
    #[must_use]
    pub fn fetch(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            image: image.into(),
            message: message.into(),
        }
    }

    /// Create a blob pull failed error.
    #[must_use]
    pub fn blob_pull_failed(digest: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BlobPullFailed {
            digest: digest.into(),
            message: message.into(),
        }
    }

    /// Create a digest mismatch error.
    #[must_use]
    pub fn digest_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::DigestMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a layout error.
    #[must_use]
    pub fn layout(path: &Path, message: impl Into<String>) -> Self {
        Self::Layout {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Create an extraction failed error.
    #[must_use]
    pub fn extraction_failed(dest: &Path, message: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            dest: dest.to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a cache error.
    #[must_use]
    pub fn cache(path: &Path, message: impl Into<String>) -> Self {
        Self::Cache {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a parse error.
    #[must_use]
    pub fn parse(path: &Path, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a channel not found error.
    #[must_use]
    pub fn channel_not_found(package: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::ChannelNotFound {
            package: package.into(),
            channel: channel.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::VersionRequired
            | Self::CatalogRequired
            | Self::InvalidOptions
            | Self::InvalidReference(..) => ErrorCategory::InputValidation,
            Self::RemoteInfo { .. }
            | Self::Fetch { .. }
            | Self::BlobPullFailed { .. }
            | Self::DigestMismatch { .. }
            | Self::Layout { .. }
            | Self::NoCatalogsForVersion(_) => ErrorCategory::Remote,
            Self::ExtractionFailed { .. } => ErrorCategory::Extraction,
            Self::NoCatalogFound { .. } => ErrorCategory::Exhaustion,
            Self::Parse { .. } | Self::Json(_) => ErrorCategory::Parse,
            Self::PackageNotFound(_) | Self::ChannelNotFound { .. } => ErrorCategory::NotFound,
            Self::Cache { .. } => ErrorCategory::Cache,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::Config(_) | Self::Task(_) | Self::Io(_) => ErrorCategory::Internal,
        }
    }

    /// Whether this error reports a missing package or channel rather than a failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }
}
