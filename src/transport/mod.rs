//! storage transports for reading and writing images

pub mod dir;
pub mod oci;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::digest::Digest;
use crate::error::{IoResultExt, Result};
use crate::reference::ImageReference;

/// read side of a storage transport
pub trait ImageSource {
    /// the reference this source was opened from
    fn reference(&self) -> &ImageReference;

    /// fetch a manifest: the top-level one, or an instance by digest
    fn manifest(&self, instance: Option<&Digest>) -> Result<Vec<u8>>;

    /// fetch a blob, verified against its digest
    fn blob(&self, digest: &Digest) -> Result<Vec<u8>>;
}

/// write side of a storage transport
pub trait ImageDestination {
    /// the reference this destination was opened from
    fn reference(&self) -> &ImageReference;

    /// whether a blob is already present
    fn has_blob(&self, digest: &Digest) -> bool;

    /// write a blob; verified and stored under `expected` when given,
    /// digested with the canonical algorithm otherwise
    fn put_blob(&mut self, data: &[u8], expected: Option<&Digest>) -> Result<Digest>;

    /// write a manifest: an instance by digest, or the top-level one
    fn put_manifest(&mut self, data: &[u8], instance: Option<&Digest>) -> Result<Digest>;
}

/// atomic write: unique temp file next to the destination, fsync, rename
pub(crate) fn write_atomic(dest: &Path, data: &[u8]) -> Result<()> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_path(parent)?;

    let tmp_path = parent.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
    {
        let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        tmp_file.write_all(data).with_path(&tmp_path)?;
        tmp_file.sync_all().with_path(&tmp_path)?;
    }

    fs::rename(&tmp_path, dest).with_path(dest)?;
    fsync_dir(parent)?;
    Ok(())
}

/// fsync a directory
pub(crate) fn fsync_dir(path: &Path) -> Result<()> {
    let dir = File::open(path).with_path(path)?;
    dir.sync_all().with_path(path)?;
    Ok(())
}
