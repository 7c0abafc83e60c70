//! ocikit - copy, inspect and delete container images across storage transports
//!
//! images live in local transports (`dir:PATH`, `oci:PATH[:TAG]`) as a
//! manifest (or multi-arch index), an image configuration blob, and layer
//! blobs, all content-addressed by digest.
//!
//! # Core concepts
//!
//! - **Manifest**: JSON document describing one image (config + layers)
//! - **Index**: multi-arch manifest list, one entry per platform
//! - **Digest**: `algorithm:hex` content address, verified on every transfer
//! - **Selector**: the `--multi-arch` mini-language picking index instances
//!   (`system`, `arch=[...]`, `platform=[...]`, `digest=[...]`)
//!
//! # Example usage
//!
//! ```no_run
//! use ocikit::ops::{copy, CopyOptions};
//! use ocikit::ImageReference;
//!
//! let src = ImageReference::parse("oci:/srv/images:app-v1").unwrap();
//! let dest = ImageReference::parse("dir:/tmp/app").unwrap();
//! copy(&src, &dest, &CopyOptions::default()).unwrap();
//! ```

mod config;
mod digest;
mod error;
mod multiarch;
mod reference;

pub mod ops;
pub mod transport;
pub mod types;

pub use config::{Config, OverrideDefaults};
pub use digest::{Algorithm, Digest};
pub use error::{Error, Result};
pub use multiarch::{parse_selector, PlatformOverrides, Selection};
pub use reference::{ImageReference, Transport};
pub use types::{
    Descriptor, ImageConfig, ImageIndex, ImageManifest, Manifest, Platform,
};
