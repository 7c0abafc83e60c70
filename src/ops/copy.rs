//! copy an image between transports

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::multiarch::{PlatformOverrides, Selection};
use crate::reference::ImageReference;
use crate::transport::{ImageDestination, ImageSource};
use crate::types::{Descriptor, ImageIndex, ImageManifest, Manifest};

/// options for a copy operation
#[derive(Clone, Debug)]
pub struct CopyOptions {
    /// copy every instance of a multi-arch image list, plus the list itself
    pub all: bool,
    /// copy only the selected instances, as a sparse index
    pub selection: Option<Selection>,
    /// platform overrides used to resolve instances
    pub overrides: PlatformOverrides,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            all: false,
            selection: None,
            overrides: PlatformOverrides::host(),
        }
    }
}

/// counters for a finished copy
#[derive(Clone, Debug, Default)]
pub struct CopyReport {
    pub manifests_written: usize,
    pub blobs_copied: usize,
    pub blobs_skipped: usize,
    pub bytes_transferred: u64,
}

/// copy an image from one transport to another
///
/// a multi-arch source is reduced to the overridden-or-host instance by
/// default; `all` copies the complete list, a selection copies the listed
/// instances under a sparse index preserving selection order.
pub fn copy(
    src_ref: &ImageReference,
    dest_ref: &ImageReference,
    options: &CopyOptions,
) -> Result<CopyReport> {
    let src = src_ref.new_source()?;
    let mut dest = dest_ref.new_destination()?;
    let mut report = CopyReport::default();

    let top = src.manifest(None)?;
    match Manifest::parse(&top)? {
        Manifest::Image(manifest) => {
            if options.selection.is_some() {
                return Err(Error::NotAManifestList(src_ref.to_string()));
            }
            // --all on a single image degenerates to a plain copy
            copy_image(&*src, &mut *dest, &manifest, &top, None, &mut report)?;
        }
        Manifest::Index(index) => {
            if options.all {
                copy_all(&*src, &mut *dest, &index, &top, &mut report)?;
            } else if let Some(selection) = &options.selection {
                copy_sparse(
                    &*src,
                    &mut *dest,
                    &index,
                    selection,
                    &options.overrides,
                    &mut report,
                )?;
            } else {
                // default: the matching instance becomes the image
                let want = options.overrides.effective_platform();
                let descriptor = index
                    .choose_instance(&want)
                    .ok_or(Error::NoMatchingInstance(want))?;
                let (manifest, data) = fetch_instance(&*src, descriptor)?;
                copy_image(&*src, &mut *dest, &manifest, &data, None, &mut report)?;
            }
        }
    }

    tracing::info!(
        "copied {} to {}: {} manifests, {} blobs, {} bytes",
        src_ref,
        dest_ref,
        report.manifests_written,
        report.blobs_copied,
        report.bytes_transferred,
    );
    Ok(report)
}

/// fetch an instance manifest; a nested index is not copyable as an image
fn fetch_instance(
    src: &dyn ImageSource,
    descriptor: &Descriptor,
) -> Result<(ImageManifest, Vec<u8>)> {
    let data = src.manifest(Some(&descriptor.digest))?;
    match Manifest::parse(&data)? {
        Manifest::Image(manifest) => Ok((manifest, data)),
        Manifest::Index(_) => Err(Error::UnsupportedMediaType(format!(
            "nested image index {}",
            descriptor.digest
        ))),
    }
}

/// copy one image manifest and the blobs it references
fn copy_image(
    src: &dyn ImageSource,
    dest: &mut dyn ImageDestination,
    manifest: &ImageManifest,
    raw: &[u8],
    instance: Option<&Digest>,
    report: &mut CopyReport,
) -> Result<()> {
    copy_blob(src, dest, &manifest.config, report)?;
    for layer in &manifest.layers {
        copy_blob(src, dest, layer, report)?;
    }

    dest.put_manifest(raw, instance)?;
    report.manifests_written += 1;
    Ok(())
}

fn copy_blob(
    src: &dyn ImageSource,
    dest: &mut dyn ImageDestination,
    descriptor: &Descriptor,
    report: &mut CopyReport,
) -> Result<()> {
    if dest.has_blob(&descriptor.digest) {
        tracing::debug!("blob {} already present, skipping", descriptor.digest);
        report.blobs_skipped += 1;
        return Ok(());
    }

    let data = src.blob(&descriptor.digest)?;
    dest.put_blob(&data, Some(&descriptor.digest))?;
    report.blobs_copied += 1;
    report.bytes_transferred += data.len() as u64;
    Ok(())
}

/// copy every instance, then the index itself, digests preserved
fn copy_all(
    src: &dyn ImageSource,
    dest: &mut dyn ImageDestination,
    index: &ImageIndex,
    raw: &[u8],
    report: &mut CopyReport,
) -> Result<()> {
    for descriptor in &index.manifests {
        let (manifest, data) = fetch_instance(src, descriptor)?;
        copy_image(src, dest, &manifest, &data, Some(&descriptor.digest), report)?;
    }
    dest.put_manifest(raw, None)?;
    report.manifests_written += 1;
    Ok(())
}

/// copy the selected instances and write a sparse index over them
fn copy_sparse(
    src: &dyn ImageSource,
    dest: &mut dyn ImageDestination,
    index: &ImageIndex,
    selection: &Selection,
    overrides: &PlatformOverrides,
    report: &mut CopyReport,
) -> Result<()> {
    // resolve every selected entry before moving any data
    let mut chosen: Vec<Descriptor> = Vec::new();
    for platform in &selection.platforms {
        let want = overrides.resolve(platform);
        let descriptor = index
            .choose_instance(&want)
            .ok_or(Error::NoMatchingInstance(want))?;
        chosen.push(descriptor.clone());
    }
    for digest in &selection.digests {
        let descriptor = index
            .find_digest(digest)
            .ok_or_else(|| Error::InstanceNotFound(digest.clone()))?;
        chosen.push(descriptor.clone());
    }

    for descriptor in &chosen {
        let (manifest, data) = fetch_instance(src, descriptor)?;
        copy_image(src, dest, &manifest, &data, Some(&descriptor.digest), report)?;
    }

    // the sparse index preserves selection order
    let sparse = ImageIndex::new(chosen);
    dest.put_manifest(&serde_json::to_vec_pretty(&sparse)?, None)?;
    report.manifests_written += 1;
    Ok(())
}
