//! transport-qualified image references
//!
//! references are written `TRANSPORT:NAME`, e.g. `dir:/tmp/img` or
//! `oci:/srv/layout:v1.0`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::transport::{dir, oci, ImageDestination, ImageSource};

/// storage backend addressed by a reference
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// flat directory holding one image
    Dir,
    /// OCI image layout, possibly holding several tagged images
    Oci,
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Transport::Dir => "dir",
            Transport::Oci => "oci",
        }
    }

    /// supported transport names, for help and completion text
    pub fn names() -> &'static [&'static str] {
        &["dir", "oci"]
    }
}

impl TryFrom<&str> for Transport {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "dir" => Ok(Transport::Dir),
            "oci" => Ok(Transport::Oci),
            other => Err(Error::UnknownTransport(other.to_string())),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// a transport-qualified image location
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageReference {
    pub transport: Transport,
    /// transport-specific remainder: a path, optionally `:TAG` for oci
    pub name: String,
}

impl ImageReference {
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }

    /// tag encoded in the name, for transports that support one
    pub fn tag(&self) -> Option<&str> {
        match self.transport {
            Transport::Dir => None,
            Transport::Oci => oci::split_name(&self.name).1,
        }
    }

    /// open the referenced image for reading
    pub fn new_source(&self) -> Result<Box<dyn ImageSource>> {
        match self.transport {
            Transport::Dir => Ok(Box::new(dir::DirSource::open(self)?)),
            Transport::Oci => Ok(Box::new(oci::OciSource::open(self)?)),
        }
    }

    /// open the referenced location for writing
    pub fn new_destination(&self) -> Result<Box<dyn ImageDestination>> {
        match self.transport {
            Transport::Dir => Ok(Box::new(dir::DirDestination::create(self)?)),
            Transport::Oci => Ok(Box::new(oci::OciDestination::create(self)?)),
        }
    }

    /// delete the referenced image from its transport
    pub fn delete_image(&self) -> Result<()> {
        match self.transport {
            Transport::Dir => dir::delete_image(self),
            Transport::Oci => oci::delete_image(self),
        }
    }
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (transport, name) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidReference(s.to_string()))?;
        if name.is_empty() {
            return Err(Error::InvalidReference(s.to_string()));
        }
        Ok(Self {
            transport: Transport::try_from(transport)?,
            name: name.to_string(),
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transport, self.name)
    }
}
