use std::path::PathBuf;

use crate::digest::Digest;
use crate::types::Platform;

/// error type for ocikit operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unrecognized value {0:?}")]
    UnrecognizedSelector(String),

    #[error("expected ] not found in {0:?}")]
    UnterminatedSelectorList(String),

    #[error("invalid digest {0:?}")]
    InvalidDigest(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },

    #[error("invalid image reference {0:?}")]
    InvalidReference(String),

    #[error("unknown transport in {0:?}")]
    UnknownTransport(String),

    #[error("no image found at {0}")]
    ImageNotFound(String),

    #[error("tag not found: {0}")]
    TagNotFound(String),

    #[error("{0} matches more than one image, a tag is required")]
    AmbiguousReference(String),

    #[error("blob not found: {0}")]
    BlobNotFound(Digest),

    #[error("no instance with digest {0}")]
    InstanceNotFound(Digest),

    #[error("no image found in manifest list for {0}")]
    NoMatchingInstance(Platform),

    #[error("image {0} is not a manifest list")]
    NotAManifestList(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("invalid storage layout at {path}: {message}")]
    InvalidLayout { path: PathBuf, message: String },

    #[error("lock contention on image layout")]
    LockContention,

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
