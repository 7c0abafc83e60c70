use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha384, Sha512};

use crate::error::{Error, Result};

/// digest algorithms understood by the store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    /// algorithm used for newly written content
    pub const CANONICAL: Algorithm = Algorithm::Sha256;

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
        }
    }

    /// length of the hex encoding for this algorithm
    pub fn hex_len(&self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
            Algorithm::Sha384 => 96,
            Algorithm::Sha512 => 128,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(Algorithm::Sha256),
            "sha384" => Some(Algorithm::Sha384),
            "sha512" => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    /// digest content with this algorithm
    pub fn digest(&self, data: &[u8]) -> Digest {
        let hex = match self {
            Algorithm::Sha256 => hex::encode(Sha256::digest(data)),
            Algorithm::Sha384 => hex::encode(Sha384::digest(data)),
            Algorithm::Sha512 => hex::encode(Sha512::digest(data)),
        };
        Digest {
            algorithm: *self,
            hex,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// content-addressed identifier in `algorithm:hex` form
///
/// parsing validates the encoding (known algorithm, lowercase hex of the
/// algorithm's length); content is never recomputed on parse.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: Algorithm,
    hex: String,
}

impl Digest {
    /// parse and validate an `algorithm:hex` string
    pub fn parse(s: &str) -> Result<Self> {
        let (name, hex) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidDigest(s.to_string()))?;
        let algorithm =
            Algorithm::from_name(name).ok_or_else(|| Error::InvalidDigest(s.to_string()))?;
        if hex.len() != algorithm.hex_len()
            || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(Error::InvalidDigest(s.to_string()));
        }
        Ok(Self {
            algorithm,
            hex: hex.to_string(),
        })
    }

    /// digest content with the canonical algorithm
    pub fn canonical(data: &[u8]) -> Self {
        Algorithm::CANONICAL.digest(data)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// hex-encoded hash value, without the algorithm prefix
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// verify that content hashes to this digest
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let actual = self.algorithm.digest(data);
        if *self != actual {
            return Err(Error::DigestMismatch {
                expected: self.clone(),
                actual,
            });
        }
        Ok(())
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}:{})", self.algorithm, &self.hex[..12])
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
