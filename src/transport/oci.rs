//! oci transport: OCI image layout, possibly holding several tagged images
//!
//! layout:
//!   oci-layout            layout version marker
//!   index.json            one entry per stored image, tags as annotations
//!   blobs/<alg>/<hex>     manifests, configs and layers

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::digest::Digest;
use crate::error::{Error, IoResultExt, Result};
use crate::reference::ImageReference;
use crate::transport::{write_atomic, ImageDestination, ImageSource};
use crate::types::{detect_media_type, Descriptor, ImageIndex, Manifest, ANNOTATION_REF_NAME};

const LAYOUT_FILE: &str = "oci-layout";
const LAYOUT_VERSION: &str = "1.0.0";
const INDEX_FILE: &str = "index.json";
const BLOBS_DIR: &str = "blobs";
const LOCK_FILE: &str = ".lock";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutMarker {
    image_layout_version: String,
}

/// split an oci reference name into directory path and optional tag
pub(crate) fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once(':') {
        Some((path, tag))
            if !path.is_empty() && !tag.is_empty() && !tag.contains('/') && !tag.contains('\\') =>
        {
            (path, Some(tag))
        }
        _ => (name, None),
    }
}

fn blob_path(base: &Path, digest: &Digest) -> PathBuf {
    base.join(BLOBS_DIR)
        .join(digest.algorithm().name())
        .join(digest.hex())
}

fn read_blob(base: &Path, digest: &Digest) -> Result<Vec<u8>> {
    let path = blob_path(base, digest);
    fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::BlobNotFound(digest.clone())
        } else {
            Error::Io { path, source: e }
        }
    })
}

fn check_layout(base: &Path) -> Result<()> {
    let path = base.join(LAYOUT_FILE);
    let content = fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::InvalidLayout {
                path: base.to_path_buf(),
                message: "missing oci-layout file".to_string(),
            }
        } else {
            Error::Io { path, source: e }
        }
    })?;
    let marker: LayoutMarker = serde_json::from_slice(&content)?;
    if marker.image_layout_version != LAYOUT_VERSION {
        return Err(Error::InvalidLayout {
            path: base.to_path_buf(),
            message: format!("unsupported layout version {}", marker.image_layout_version),
        });
    }
    Ok(())
}

fn read_index(base: &Path) -> Result<ImageIndex> {
    let path = base.join(INDEX_FILE);
    let content = fs::read(&path).with_path(&path)?;
    Ok(serde_json::from_slice(&content)?)
}

fn write_index(base: &Path, index: &ImageIndex) -> Result<()> {
    let data = serde_json::to_vec_pretty(index)?;
    write_atomic(&base.join(INDEX_FILE), &data)
}

/// guard holding the layout lock until dropped
struct LayoutLock {
    #[allow(dead_code)]
    flock: Flock<File>,
}

fn lock_layout(base: &Path) -> Result<LayoutLock> {
    let lock_path = base.join(LOCK_FILE);
    let file = File::create(&lock_path).with_path(&lock_path)?;
    let flock =
        Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|_| Error::LockContention)?;
    Ok(LayoutLock { flock })
}

/// read side of the oci transport
pub struct OciSource {
    reference: ImageReference,
    path: PathBuf,
    tag: Option<String>,
    index: ImageIndex,
}

impl OciSource {
    pub fn open(reference: &ImageReference) -> Result<Self> {
        let (path, tag) = split_name(&reference.name);
        let path = PathBuf::from(path);
        check_layout(&path)?;
        let index = read_index(&path)?;
        Ok(Self {
            reference: reference.clone(),
            path,
            tag: tag.map(String::from),
            index,
        })
    }

    /// index entry the reference points at: the tagged one, or the only one
    fn resolve_descriptor(&self) -> Result<&Descriptor> {
        match &self.tag {
            Some(tag) => self
                .index
                .manifests
                .iter()
                .find(|d| d.tag() == Some(tag))
                .ok_or_else(|| Error::TagNotFound(tag.clone())),
            None => match self.index.manifests.as_slice() {
                [single] => Ok(single),
                [] => Err(Error::ImageNotFound(self.reference.to_string())),
                _ => Err(Error::AmbiguousReference(self.reference.to_string())),
            },
        }
    }
}

impl ImageSource for OciSource {
    fn reference(&self) -> &ImageReference {
        &self.reference
    }

    fn manifest(&self, instance: Option<&Digest>) -> Result<Vec<u8>> {
        match instance {
            Some(digest) => read_blob(&self.path, digest).map_err(|e| match e {
                Error::BlobNotFound(d) => Error::InstanceNotFound(d),
                other => other,
            }),
            None => {
                let descriptor = self.resolve_descriptor()?;
                read_blob(&self.path, &descriptor.digest)
            }
        }
    }

    fn blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        let data = read_blob(&self.path, digest)?;
        digest.verify(&data)?;
        Ok(data)
    }
}

/// write side of the oci transport
pub struct OciDestination {
    reference: ImageReference,
    path: PathBuf,
    tag: Option<String>,
}

impl OciDestination {
    pub fn create(reference: &ImageReference) -> Result<Self> {
        let (path, tag) = split_name(&reference.name);
        let path = PathBuf::from(path);
        fs::create_dir_all(path.join(BLOBS_DIR)).with_path(&path)?;

        if path.join(LAYOUT_FILE).is_file() {
            check_layout(&path)?;
        } else {
            let marker = LayoutMarker {
                image_layout_version: LAYOUT_VERSION.to_string(),
            };
            write_atomic(&path.join(LAYOUT_FILE), &serde_json::to_vec(&marker)?)?;
        }
        if !path.join(INDEX_FILE).is_file() {
            write_index(&path, &ImageIndex::new(vec![]))?;
        }

        Ok(Self {
            reference: reference.clone(),
            path,
            tag: tag.map(String::from),
        })
    }

    fn write_blob(&self, data: &[u8], digest: &Digest) -> Result<()> {
        let path = blob_path(&self.path, digest);
        if path.is_file() {
            return Ok(());
        }
        write_atomic(&path, data)?;
        tracing::debug!("stored blob {} ({} bytes)", digest, data.len());
        Ok(())
    }
}

impl ImageDestination for OciDestination {
    fn reference(&self) -> &ImageReference {
        &self.reference
    }

    fn has_blob(&self, digest: &Digest) -> bool {
        blob_path(&self.path, digest).is_file()
    }

    fn put_blob(&mut self, data: &[u8], expected: Option<&Digest>) -> Result<Digest> {
        let digest = match expected {
            Some(d) => {
                d.verify(data)?;
                d.clone()
            }
            None => Digest::canonical(data),
        };
        self.write_blob(data, &digest)?;
        Ok(digest)
    }

    fn put_manifest(&mut self, data: &[u8], instance: Option<&Digest>) -> Result<Digest> {
        if let Some(digest) = instance {
            digest.verify(data)?;
            self.write_blob(data, digest)?;
            return Ok(digest.clone());
        }

        let digest = Digest::canonical(data);
        self.write_blob(data, &digest)?;

        let mut descriptor =
            Descriptor::new(detect_media_type(data)?, digest.clone(), data.len() as u64);
        if let Some(tag) = &self.tag {
            let mut annotations = BTreeMap::new();
            annotations.insert(ANNOTATION_REF_NAME.to_string(), tag.clone());
            descriptor.annotations = Some(annotations);
        }

        // replace any entry for the same tag (or the same digest when untagged)
        let _lock = lock_layout(&self.path)?;
        let mut index = read_index(&self.path)?;
        match &self.tag {
            Some(tag) => index.manifests.retain(|d| d.tag() != Some(tag)),
            None => index.manifests.retain(|d| d.digest != digest),
        }
        index.manifests.push(descriptor);
        write_index(&self.path, &index)?;

        tracing::debug!("stored manifest {}", digest);
        Ok(digest)
    }
}

/// delete an image from the layout and sweep blobs it alone referenced
pub fn delete_image(reference: &ImageReference) -> Result<()> {
    let (path, tag) = split_name(&reference.name);
    let path = PathBuf::from(path);
    check_layout(&path)?;

    let _lock = lock_layout(&path)?;
    let mut index = read_index(&path)?;

    let position = match tag {
        Some(tag) => index
            .manifests
            .iter()
            .position(|d| d.tag() == Some(tag))
            .ok_or_else(|| Error::TagNotFound(tag.to_string()))?,
        None => match index.manifests.as_slice() {
            [_] => 0,
            [] => return Err(Error::ImageNotFound(reference.to_string())),
            _ => return Err(Error::AmbiguousReference(reference.to_string())),
        },
    };
    let removed = index.manifests.remove(position);
    write_index(&path, &index)?;
    tracing::debug!("removed index entry {}", removed.digest);

    // mark everything reachable from the remaining entries, sweep the rest
    let mut reachable = HashSet::new();
    for descriptor in &index.manifests {
        mark_reachable(&path, &descriptor.digest, &mut reachable);
    }
    let swept = sweep_blobs(&path, &reachable)?;
    tracing::debug!("swept {} unreferenced blobs", swept);
    Ok(())
}

/// recursively mark a manifest and the blobs it references
fn mark_reachable(base: &Path, digest: &Digest, reachable: &mut HashSet<Digest>) {
    if !reachable.insert(digest.clone()) {
        return;
    }
    let data = match read_blob(base, digest) {
        Ok(data) => data,
        Err(_) => {
            tracing::warn!("referenced manifest {} is missing, skipping", digest);
            return;
        }
    };
    match Manifest::parse(&data) {
        Ok(Manifest::Index(nested)) => {
            for descriptor in &nested.manifests {
                mark_reachable(base, &descriptor.digest, reachable);
            }
        }
        Ok(Manifest::Image(manifest)) => {
            reachable.insert(manifest.config.digest.clone());
            for layer in &manifest.layers {
                reachable.insert(layer.digest.clone());
            }
        }
        Err(_) => {
            tracing::warn!("index entry {} is not a manifest, keeping only it", digest);
        }
    }
}

/// remove blobs not in the reachable set
fn sweep_blobs(base: &Path, reachable: &HashSet<Digest>) -> Result<usize> {
    let blobs = base.join(BLOBS_DIR);
    if !blobs.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in WalkDir::new(&blobs).min_depth(2).max_depth(2) {
        let entry = entry.map_err(|e| Error::Io {
            path: blobs.clone(),
            source: e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "walkdir error")
            }),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        // reconstruct the digest from blobs/<alg>/<hex>
        let path = entry.path();
        let hex = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let algorithm = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("");

        if let Ok(digest) = Digest::parse(&format!("{}:{}", algorithm, hex)) {
            if !reachable.contains(&digest) {
                fs::remove_file(path).with_path(path)?;
                removed += 1;
            }
        }
    }

    // clean up empty algorithm directories
    for entry in WalkDir::new(&blobs).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| Error::Io {
            path: blobs.clone(),
            source: e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "walkdir error")
            }),
        })?;
        if entry.file_type().is_dir() {
            let _ = fs::remove_dir(entry.path());
        }
    }

    Ok(removed)
}
