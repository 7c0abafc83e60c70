use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::types::Platform;

pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const MEDIA_TYPE_OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_DOCKER_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const MEDIA_TYPE_DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// annotation key carrying the tag of an index entry
pub const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";

/// content descriptor: a typed, sized pointer to a blob
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            platform: None,
            annotations: None,
        }
    }

    /// tag of an index entry, from the ref.name annotation
    pub fn tag(&self) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(ANNOTATION_REF_NAME))
            .map(String::as_str)
    }
}

/// manifest of a single-architecture image
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// multi-architecture image index (manifest list)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    pub manifests: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl ImageIndex {
    pub fn new(manifests: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: MEDIA_TYPE_OCI_INDEX.to_string(),
            manifests,
            annotations: None,
        }
    }

    /// first entry whose platform satisfies the wanted one
    pub fn choose_instance(&self, want: &Platform) -> Option<&Descriptor> {
        self.manifests
            .iter()
            .find(|d| d.platform.as_ref().is_some_and(|p| want.matches(p)))
    }

    /// entry with the given digest
    pub fn find_digest(&self, digest: &Digest) -> Option<&Descriptor> {
        self.manifests.iter().find(|d| &d.digest == digest)
    }
}

/// a parsed top-level manifest document
#[derive(Clone, Debug)]
pub enum Manifest {
    Image(ImageManifest),
    Index(ImageIndex),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Probe {
    #[serde(default)]
    media_type: String,
    #[serde(default)]
    manifests: Option<serde_json::Value>,
    #[serde(default)]
    config: Option<serde_json::Value>,
}

impl Manifest {
    /// detect and parse a manifest document
    ///
    /// the declared mediaType wins; documents without one are classified
    /// by shape (`manifests` key vs `config` key).
    pub fn parse(data: &[u8]) -> Result<Self> {
        let probe: Probe = serde_json::from_slice(data)?;
        match probe.media_type.as_str() {
            MEDIA_TYPE_OCI_INDEX | MEDIA_TYPE_DOCKER_LIST => {
                Ok(Manifest::Index(serde_json::from_slice(data)?))
            }
            MEDIA_TYPE_OCI_MANIFEST | MEDIA_TYPE_DOCKER_MANIFEST => {
                Ok(Manifest::Image(serde_json::from_slice(data)?))
            }
            "" if probe.manifests.is_some() => Ok(Manifest::Index(serde_json::from_slice(data)?)),
            "" if probe.config.is_some() => Ok(Manifest::Image(serde_json::from_slice(data)?)),
            "" => Err(Error::UnsupportedMediaType(
                "document is neither a manifest nor an index".to_string(),
            )),
            other => Err(Error::UnsupportedMediaType(other.to_string())),
        }
    }
}

/// media type of a manifest document, declared or inferred from shape
pub fn detect_media_type(data: &[u8]) -> Result<String> {
    let probe: Probe = serde_json::from_slice(data)?;
    if !probe.media_type.is_empty() {
        return Ok(probe.media_type);
    }
    match Manifest::parse(data)? {
        Manifest::Image(_) => Ok(MEDIA_TYPE_OCI_MANIFEST.to_string()),
        Manifest::Index(_) => Ok(MEDIA_TYPE_OCI_INDEX.to_string()),
    }
}
