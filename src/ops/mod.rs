//! high-level operations on image references

mod copy;
mod delete;
mod inspect;

pub use copy::{copy, CopyOptions, CopyReport};
pub use delete::delete;
pub use inspect::{inspect, raw_config, raw_manifest, InspectOptions, InspectOutput};
