//! serde types for OCI manifests, indexes and image configuration

mod image;
mod manifest;
mod platform;

pub use image::{History, ImageConfig, RootFs, RuntimeConfig};
pub use manifest::{
    detect_media_type, Descriptor, ImageIndex, ImageManifest, Manifest, ANNOTATION_REF_NAME,
    MEDIA_TYPE_DOCKER_CONFIG, MEDIA_TYPE_DOCKER_LAYER, MEDIA_TYPE_DOCKER_LIST,
    MEDIA_TYPE_DOCKER_MANIFEST, MEDIA_TYPE_OCI_CONFIG, MEDIA_TYPE_OCI_INDEX, MEDIA_TYPE_OCI_LAYER,
    MEDIA_TYPE_OCI_MANIFEST,
};
pub use platform::{host_architecture, Platform};
