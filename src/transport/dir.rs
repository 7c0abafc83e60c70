//! dir transport: one image in a flat directory
//!
//! layout:
//!   version               transport version marker
//!   manifest.json         top-level manifest or index
//!   <hex>.manifest.json   per-instance manifests
//!   <hex>                 blobs (config and layers)

use std::fs;
use std::path::{Path, PathBuf};

use crate::digest::Digest;
use crate::error::{Error, IoResultExt, Result};
use crate::reference::ImageReference;
use crate::transport::{write_atomic, ImageDestination, ImageSource};

const VERSION_FILE: &str = "version";
const VERSION_CONTENT: &str = "ocikit dir transport version: 1\n";
const MANIFEST_FILE: &str = "manifest.json";
const INSTANCE_SUFFIX: &str = ".manifest.json";

fn manifest_path(base: &Path, instance: Option<&Digest>) -> PathBuf {
    match instance {
        Some(digest) => base.join(format!("{}{}", digest.hex(), INSTANCE_SUFFIX)),
        None => base.join(MANIFEST_FILE),
    }
}

fn blob_path(base: &Path, digest: &Digest) -> PathBuf {
    base.join(digest.hex())
}

fn check_version(base: &Path) -> Result<()> {
    let path = base.join(VERSION_FILE);
    match fs::read_to_string(&path) {
        Ok(content) if content == VERSION_CONTENT => Ok(()),
        Ok(content) => Err(Error::InvalidLayout {
            path: base.to_path_buf(),
            message: format!("unsupported dir transport version {:?}", content.trim()),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io { path, source: e }),
    }
}

/// read side of the dir transport
pub struct DirSource {
    reference: ImageReference,
    path: PathBuf,
}

impl DirSource {
    pub fn open(reference: &ImageReference) -> Result<Self> {
        let path = PathBuf::from(&reference.name);
        if !path.join(MANIFEST_FILE).is_file() {
            return Err(Error::ImageNotFound(reference.to_string()));
        }
        check_version(&path)?;
        Ok(Self {
            reference: reference.clone(),
            path,
        })
    }
}

impl ImageSource for DirSource {
    fn reference(&self) -> &ImageReference {
        &self.reference
    }

    fn manifest(&self, instance: Option<&Digest>) -> Result<Vec<u8>> {
        let path = manifest_path(&self.path, instance);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                match instance {
                    Some(digest) => Error::InstanceNotFound(digest.clone()),
                    None => Error::ImageNotFound(self.reference.to_string()),
                }
            } else {
                Error::Io { path, source: e }
            }
        })
    }

    fn blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        let path = blob_path(&self.path, digest);
        let data = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::BlobNotFound(digest.clone())
            } else {
                Error::Io { path, source: e }
            }
        })?;
        digest.verify(&data)?;
        Ok(data)
    }
}

/// write side of the dir transport
pub struct DirDestination {
    reference: ImageReference,
    path: PathBuf,
}

impl DirDestination {
    pub fn create(reference: &ImageReference) -> Result<Self> {
        let path = PathBuf::from(&reference.name);
        fs::create_dir_all(&path).with_path(&path)?;
        check_version(&path)?;
        write_atomic(&path.join(VERSION_FILE), VERSION_CONTENT.as_bytes())?;
        Ok(Self {
            reference: reference.clone(),
            path,
        })
    }
}

impl ImageDestination for DirDestination {
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

        let path = blob_path(&self.path, &digest);
        if path.is_file() {
            return Ok(digest);
        }

        write_atomic(&path, data)?;
        tracing::debug!("stored blob {} ({} bytes)", digest, data.len());
        Ok(digest)
    }

    fn put_manifest(&mut self, data: &[u8], instance: Option<&Digest>) -> Result<Digest> {
        let digest = match instance {
            Some(d) => {
                d.verify(data)?;
                d.clone()
            }
            None => Digest::canonical(data),
        };
        write_atomic(&manifest_path(&self.path, instance), data)?;
        tracing::debug!("stored manifest {}", digest);
        Ok(digest)
    }
}

/// remove the stored image's files, keeping the directory itself
pub fn delete_image(reference: &ImageReference) -> Result<()> {
    let path = PathBuf::from(&reference.name);
    if !path.join(MANIFEST_FILE).is_file() {
        return Err(Error::ImageNotFound(reference.to_string()));
    }

    for entry in fs::read_dir(&path).with_path(&path)? {
        let entry = entry.with_path(&path)?;
        if !entry.file_type().with_path(&path)?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == MANIFEST_FILE
            || name == VERSION_FILE
            || name.ends_with(INSTANCE_SUFFIX)
            || is_blob_name(&name)
        {
            fs::remove_file(entry.path()).with_path(entry.path())?;
        }
    }
    Ok(())
}

fn is_blob_name(name: &str) -> bool {
    name.len() >= 64 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn dir_ref(path: &Path) -> ImageReference {
        ImageReference::parse(&format!("dir:{}", path.display())).unwrap()
    }

    #[test]
    fn test_blob_roundtrip() {
        let dir = tempdir().unwrap();
        let reference = dir_ref(&dir.path().join("img"));

        let mut dest = DirDestination::create(&reference).unwrap();
        let digest = dest.put_blob(b"layer data", None).unwrap();
        assert!(dest.has_blob(&digest));
        dest.put_manifest(b"{\"schemaVersion\": 2}", None).unwrap();

        let src = DirSource::open(&reference).unwrap();
        assert_eq!(src.blob(&digest).unwrap(), b"layer data");
    }

    #[test]
    fn test_manifest_roundtrip() {
        let dir = tempdir().unwrap();
        let reference = dir_ref(&dir.path().join("img"));

        let mut dest = DirDestination::create(&reference).unwrap();
        let top = br#"{"schemaVersion": 2}"#;
        dest.put_manifest(top, None).unwrap();

        let instance_data = br#"{"schemaVersion": 2, "layers": []}"#;
        let instance = Digest::canonical(instance_data);
        dest.put_manifest(instance_data, Some(&instance)).unwrap();

        let src = DirSource::open(&reference).unwrap();
        assert_eq!(src.manifest(None).unwrap(), top);
        assert_eq!(src.manifest(Some(&instance)).unwrap(), instance_data);
    }

    #[test]
    fn test_open_missing_image() {
        let dir = tempdir().unwrap();
        let result = DirSource::open(&dir_ref(&dir.path().join("absent")));
        assert!(matches!(result, Err(Error::ImageNotFound(_))));
    }

    #[test]
    fn test_missing_instance_manifest() {
        let dir = tempdir().unwrap();
        let reference = dir_ref(&dir.path().join("img"));

        let mut dest = DirDestination::create(&reference).unwrap();
        dest.put_manifest(b"{}", None).unwrap();

        let src = DirSource::open(&reference).unwrap();
        let missing = Digest::canonical(b"missing");
        let result = src.manifest(Some(&missing));
        assert!(matches!(result, Err(Error::InstanceNotFound(_))));
    }

    #[test]
    fn test_put_blob_digest_mismatch() {
        let dir = tempdir().unwrap();
        let mut dest = DirDestination::create(&dir_ref(&dir.path().join("img"))).unwrap();

        let wrong = Digest::canonical(b"other content");
        let result = dest.put_blob(b"actual content", Some(&wrong));
        assert!(matches!(result, Err(Error::DigestMismatch { .. })));
    }

    #[test]
    fn test_blob_read_detects_corruption() {
        let dir = tempdir().unwrap();
        let reference = dir_ref(&dir.path().join("img"));

        let mut dest = DirDestination::create(&reference).unwrap();
        let digest = dest.put_blob(b"good", None).unwrap();
        dest.put_manifest(b"{}", None).unwrap();

        // corrupt the stored blob behind the transport's back
        fs::write(blob_path(&dir.path().join("img"), &digest), b"bad").unwrap();

        let src = DirSource::open(&reference).unwrap();
        let result = src.blob(&digest);
        assert!(matches!(result, Err(Error::DigestMismatch { .. })));
    }

    #[test]
    fn test_put_blob_deduplicates() {
        let dir = tempdir().unwrap();
        let mut dest = DirDestination::create(&dir_ref(&dir.path().join("img"))).unwrap();

        let d1 = dest.put_blob(b"same", None).unwrap();
        let d2 = dest.put_blob(b"same", None).unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn test_delete_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("img");
        let reference = dir_ref(&path);

        let mut dest = DirDestination::create(&reference).unwrap();
        let digest = dest.put_blob(b"blob", None).unwrap();
        dest.put_manifest(b"{}", None).unwrap();

        delete_image(&reference).unwrap();
        assert!(!path.join(MANIFEST_FILE).exists());
        assert!(!blob_path(&path, &digest).exists());

        // second delete reports the image as gone
        let result = delete_image(&reference);
        assert!(matches!(result, Err(Error::ImageNotFound(_))));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("img");
        let reference = dir_ref(&path);

        DirDestination::create(&reference).unwrap();
        fs::write(path.join(VERSION_FILE), "something else\n").unwrap();
        fs::write(path.join(MANIFEST_FILE), "{}").unwrap();

        let result = DirSource::open(&reference);
        assert!(matches!(result, Err(Error::InvalidLayout { .. })));
    }
}
