use std::fmt;

use serde::{Deserialize, Serialize};

/// the (os, architecture, variant) triple identifying one entry of a
/// multi-arch manifest list
///
/// empty fields mean "unset"; consumers decide what unset falls back to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub variant: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            variant: String::new(),
        }
    }

    pub fn with_variant(
        os: impl Into<String>,
        architecture: impl Into<String>,
        variant: impl Into<String>,
    ) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            variant: variant.into(),
        }
    }

    /// platform of the running process, in OCI naming
    pub fn host() -> Self {
        Self::new(std::env::consts::OS, host_architecture())
    }

    /// whether a manifest-list entry satisfies this wanted platform
    ///
    /// an empty wanted variant matches any candidate variant.
    pub fn matches(&self, candidate: &Platform) -> bool {
        self.os == candidate.os
            && self.architecture == candidate.architecture
            && (self.variant.is_empty() || self.variant == candidate.variant)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if !self.variant.is_empty() {
            write!(f, "/{}", self.variant)?;
        }
        Ok(())
    }
}

/// map the Rust target architecture name to the OCI one
pub fn host_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => {
            if cfg!(target_endian = "little") {
                "ppc64le"
            } else {
                "ppc64"
            }
        }
        "loongarch64" => "loong64",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_display() {
        assert_eq!(Platform::new("linux", "amd64").to_string(), "linux/amd64");
        assert_eq!(
            Platform::with_variant("linux", "arm", "v7").to_string(),
            "linux/arm/v7"
        );
    }

    #[test]
    fn test_platform_matches() {
        let want = Platform::new("linux", "arm64");
        assert!(want.matches(&Platform::new("linux", "arm64")));
        assert!(want.matches(&Platform::with_variant("linux", "arm64", "v8")));
        assert!(!want.matches(&Platform::new("linux", "amd64")));
        assert!(!want.matches(&Platform::new("windows", "arm64")));
    }

    #[test]
    fn test_platform_matches_variant() {
        let want = Platform::with_variant("linux", "arm", "v7");
        assert!(want.matches(&Platform::with_variant("linux", "arm", "v7")));
        assert!(!want.matches(&Platform::with_variant("linux", "arm", "v6")));
        assert!(!want.matches(&Platform::new("linux", "arm")));
    }

    #[test]
    fn test_platform_serde_omits_empty() {
        let json = serde_json::to_string(&Platform::new("linux", "amd64")).unwrap();
        assert!(!json.contains("variant"));

        let parsed: Platform = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Platform::new("linux", "amd64"));
    }

    #[test]
    fn test_host_platform_nonempty() {
        let host = Platform::host();
        assert!(!host.os.is_empty());
        assert!(!host.architecture.is_empty());
    }
}
