//! inspect an image's manifest and configuration

use std::collections::BTreeMap;

use serde::Serialize;

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::multiarch::PlatformOverrides;
use crate::reference::ImageReference;
use crate::transport::ImageSource;
use crate::types::{ImageConfig, ImageManifest, Manifest};

/// options for an inspect operation
#[derive(Clone, Debug)]
pub struct InspectOptions {
    /// platform overrides used to resolve multi-arch images
    pub overrides: PlatformOverrides,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            overrides: PlatformOverrides::host(),
        }
    }
}

/// the JSON document printed by `ocikit inspect`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectOutput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub architecture: String,
    pub os: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub variant: String,
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    pub layers: Vec<String>,
}

/// read manifest and config of an image and summarize them
///
/// a multi-arch image resolves to the overridden-or-host instance; the
/// reported digest is always that of the top-level manifest.
pub fn inspect(reference: &ImageReference, options: &InspectOptions) -> Result<InspectOutput> {
    let src = reference.new_source()?;
    let top = src.manifest(None)?;
    let (manifest, _) = resolve_image(&*src, &top, &options.overrides)?;

    let config_data = src.blob(&manifest.config.digest)?;
    let config: ImageConfig = serde_json::from_slice(&config_data)?;

    Ok(InspectOutput {
        name: reference.to_string(),
        tag: reference.tag().map(String::from),
        digest: Digest::canonical(&top).to_string(),
        created: config.created,
        architecture: config.architecture,
        os: config.os,
        variant: config.variant,
        labels: config.config.labels.unwrap_or_default(),
        env: config.config.env,
        layers: manifest
            .layers
            .iter()
            .map(|layer| layer.digest.to_string())
            .collect(),
    })
}

/// raw top-level manifest bytes (`inspect --raw`)
pub fn raw_manifest(reference: &ImageReference) -> Result<Vec<u8>> {
    reference.new_source()?.manifest(None)
}

/// raw configuration blob (`inspect --config`)
pub fn raw_config(reference: &ImageReference, options: &InspectOptions) -> Result<Vec<u8>> {
    let src = reference.new_source()?;
    let top = src.manifest(None)?;
    let (manifest, _) = resolve_image(&*src, &top, &options.overrides)?;
    src.blob(&manifest.config.digest)
}

/// reduce a top-level manifest to a single-arch image manifest
fn resolve_image(
    src: &dyn ImageSource,
    top: &[u8],
    overrides: &PlatformOverrides,
) -> Result<(ImageManifest, Vec<u8>)> {
    match Manifest::parse(top)? {
        Manifest::Image(manifest) => Ok((manifest, top.to_vec())),
        Manifest::Index(index) => {
            let want = overrides.effective_platform();
            let descriptor = index
                .choose_instance(&want)
                .ok_or(Error::NoMatchingInstance(want))?;
            let data = src.manifest(Some(&descriptor.digest))?;
            match Manifest::parse(&data)? {
                Manifest::Image(manifest) => Ok((manifest, data)),
                Manifest::Index(_) => Err(Error::UnsupportedMediaType(format!(
                    "nested image index {}",
                    descriptor.digest
                ))),
            }
        }
    }
}
