//! selection of multi-arch image-list instances
//!
//! the `--multi-arch` flag takes either the keyword `system` or a
//! comma-joined sequence of clauses:
//!
//! ```text
//! selector := "system" | clause ("," clause)*
//! clause   := "arch=" list | "platform=" list | "digest=" list
//! list     := "[" item ("," item)* "]"
//! ```
//!
//! parsing is pure and all-or-nothing: either the whole selector parses
//! or an error naming the offending fragment is returned.

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::types::{host_architecture, Platform};

/// platform overrides for one invocation
///
/// the host os/architecture are injected at construction instead of being
/// read inside the parser, so results are deterministic on any build host.
#[derive(Clone, Debug)]
pub struct PlatformOverrides {
    pub os: Option<String>,
    pub arch: Option<String>,
    pub variant: Option<String>,
    pub host_os: String,
    pub host_arch: String,
}

impl PlatformOverrides {
    /// no overrides, host defaults taken from the running process
    pub fn host() -> Self {
        Self {
            os: None,
            arch: None,
            variant: None,
            host_os: std::env::consts::OS.to_string(),
            host_arch: host_architecture().to_string(),
        }
    }

    /// the platform an instance must match when no selector is given:
    /// every unset override falls back to the host value
    pub fn effective_platform(&self) -> Platform {
        Platform {
            os: self.os.clone().unwrap_or_else(|| self.host_os.clone()),
            architecture: self.arch.clone().unwrap_or_else(|| self.host_arch.clone()),
            variant: self.variant.clone().unwrap_or_default(),
        }
    }

    /// fill empty fields of a selected platform from the host values
    ///
    /// `system` selections carry overrides verbatim, leaving unset fields
    /// empty; consumers resolve them here before matching instances.
    pub fn resolve(&self, platform: &Platform) -> Platform {
        Platform {
            os: if platform.os.is_empty() {
                self.host_os.clone()
            } else {
                platform.os.clone()
            },
            architecture: if platform.architecture.is_empty() {
                self.host_arch.clone()
            } else {
                platform.architecture.clone()
            },
            variant: platform.variant.clone(),
        }
    }

    fn os_or_host(&self) -> &str {
        self.os.as_deref().unwrap_or(&self.host_os)
    }

    /// platform built from the overrides alone; unset fields stay empty
    fn system_platform(&self) -> Platform {
        Platform {
            os: self.os.clone().unwrap_or_default(),
            architecture: self.arch.clone().unwrap_or_default(),
            variant: self.variant.clone().unwrap_or_default(),
        }
    }
}

/// instances selected out of a multi-arch image list
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub platforms: Vec<Platform>,
    pub digests: Vec<Digest>,
}

#[derive(Clone, Copy)]
enum ClauseKind {
    Arch,
    Platform,
    Digest,
}

const CLAUSES: [(&str, ClauseKind); 3] = [
    ("arch=[", ClauseKind::Arch),
    ("platform=[", ClauseKind::Platform),
    ("digest=[", ClauseKind::Digest),
];

/// parse a `--multi-arch` selector
///
/// `system` selects the single instance matching the overridden-or-host
/// platform. clause contents land in the result in clause-encounter order
/// and are not deduplicated; `arch=` entries take the overridden-or-host
/// os and the overridden variant, `platform=` entries are used verbatim.
pub fn parse_selector(overrides: &PlatformOverrides, input: &str) -> Result<Selection> {
    if input == "system" {
        return Ok(Selection {
            platforms: vec![overrides.system_platform()],
            digests: vec![],
        });
    }

    let mut selection = Selection::default();
    let mut rest = input;
    loop {
        rest = parse_clause(overrides, rest, &mut selection)?;
        if rest.is_empty() {
            return Ok(selection);
        }
    }
}

/// consume one `key=[items]` clause from the front of `rest`, returning
/// whatever follows its separating comma
fn parse_clause<'a>(
    overrides: &PlatformOverrides,
    rest: &'a str,
    selection: &mut Selection,
) -> Result<&'a str> {
    for (prefix, kind) in CLAUSES {
        let Some(body) = rest.strip_prefix(prefix) else {
            continue;
        };
        let Some(end) = body.find(']') else {
            return Err(Error::UnterminatedSelectorList(rest.to_string()));
        };

        for item in body[..end].split(',') {
            match kind {
                ClauseKind::Arch => selection.platforms.push(Platform {
                    os: overrides.os_or_host().to_string(),
                    architecture: item.to_string(),
                    variant: overrides.variant.clone().unwrap_or_default(),
                }),
                ClauseKind::Platform => selection.platforms.push(parse_platform_item(item)?),
                ClauseKind::Digest => selection.digests.push(item.parse()?),
            }
        }

        // after the list: end of input, or a comma introducing the next clause
        let after = &body[end + 1..];
        return match after.strip_prefix(',') {
            None if after.is_empty() => Ok(""),
            Some(tail) if !tail.is_empty() => Ok(tail),
            _ => Err(Error::UnrecognizedSelector(after.to_string())),
        };
    }
    Err(Error::UnrecognizedSelector(rest.to_string()))
}

/// split an `os/arch[/variant]` item into a platform, verbatim
fn parse_platform_item(item: &str) -> Result<Platform> {
    let mut parts = item.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(os), Some(arch), None, None) => Ok(Platform::new(os, arch)),
        (Some(os), Some(arch), Some(variant), None) => {
            Ok(Platform::with_variant(os, arch, variant))
        }
        _ => Err(Error::UnrecognizedSelector(item.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(os: &str, arch: &str, variant: &str) -> PlatformOverrides {
        PlatformOverrides {
            os: (!os.is_empty()).then(|| os.to_string()),
            arch: (!arch.is_empty()).then(|| arch.to_string()),
            variant: (!variant.is_empty()).then(|| variant.to_string()),
            host_os: "hostos".to_string(),
            host_arch: "hostarch".to_string(),
        }
    }

    fn none() -> PlatformOverrides {
        overrides("", "", "")
    }

    #[test]
    fn test_system_no_overrides() {
        let selection = parse_selector(&none(), "system").unwrap();
        assert_eq!(selection.platforms, vec![Platform::default()]);
        assert!(selection.digests.is_empty());
    }

    #[test]
    fn test_system_with_os() {
        let selection = parse_selector(&overrides("someOS", "", ""), "system").unwrap();
        assert_eq!(
            selection.platforms,
            vec![Platform {
                os: "someOS".to_string(),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn test_system_with_arch() {
        let selection = parse_selector(&overrides("", "someArch", ""), "system").unwrap();
        assert_eq!(
            selection.platforms,
            vec![Platform {
                architecture: "someArch".to_string(),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn test_system_with_os_and_arch() {
        let selection = parse_selector(&overrides("someOS", "someArch", ""), "system").unwrap();
        assert_eq!(selection.platforms, vec![Platform::new("someOS", "someArch")]);
    }

    #[test]
    fn test_system_not_combinable() {
        let err = parse_selector(&none(), "system,arch=[amd64]").unwrap_err();
        assert!(matches!(err, Error::UnrecognizedSelector(_)));
        assert!(err.to_string().contains("unrecognized value"));
    }

    #[test]
    fn test_arch_single() {
        let selection =
            parse_selector(&overrides("someOS", "someArch", ""), "arch=[amd64]").unwrap();
        assert_eq!(selection.platforms, vec![Platform::new("someOS", "amd64")]);
        assert!(selection.digests.is_empty());
    }

    #[test]
    fn test_arch_list() {
        let selection =
            parse_selector(&overrides("someOS", "someArch", ""), "arch=[amd64,ppc64le]").unwrap();
        assert_eq!(
            selection.platforms,
            vec![
                Platform::new("someOS", "amd64"),
                Platform::new("someOS", "ppc64le"),
            ]
        );
    }

    #[test]
    fn test_arch_host_defaulted_os() {
        let selection = parse_selector(&none(), "arch=[amd64,s390x,ppc64le]").unwrap();
        assert_eq!(
            selection.platforms,
            vec![
                Platform::new("hostos", "amd64"),
                Platform::new("hostos", "s390x"),
                Platform::new("hostos", "ppc64le"),
            ]
        );
    }

    #[test]
    fn test_arch_takes_override_variant() {
        let selection = parse_selector(&overrides("", "", "v8"), "arch=[arm64]").unwrap();
        assert_eq!(
            selection.platforms,
            vec![Platform::with_variant("hostos", "arm64", "v8")]
        );
    }

    #[test]
    fn test_arch_names_not_validated() {
        let selection = parse_selector(&none(), "arch=[bogusarch]").unwrap();
        assert_eq!(selection.platforms[0].architecture, "bogusarch");
    }

    #[test]
    fn test_platform_pair() {
        let selection = parse_selector(&none(), "platform=[linux/riscv]").unwrap();
        assert_eq!(selection.platforms, vec![Platform::new("linux", "riscv")]);
    }

    #[test]
    fn test_platform_list() {
        let selection =
            parse_selector(&none(), "platform=[linux/riscv,windows/riscv,linux/ppc64le]").unwrap();
        assert_eq!(
            selection.platforms,
            vec![
                Platform::new("linux", "riscv"),
                Platform::new("windows", "riscv"),
                Platform::new("linux", "ppc64le"),
            ]
        );
    }

    #[test]
    fn test_platform_with_variant() {
        let selection = parse_selector(&none(), "platform=[linux/arm/v7]").unwrap();
        assert_eq!(
            selection.platforms,
            vec![Platform::with_variant("linux", "arm", "v7")]
        );
    }

    #[test]
    fn test_platform_ignores_overrides() {
        let selection = parse_selector(
            &overrides("someOS", "someArch", "someVariant"),
            "platform=[linux/riscv]",
        )
        .unwrap();
        assert_eq!(selection.platforms, vec![Platform::new("linux", "riscv")]);
    }

    #[test]
    fn test_platform_wrong_segment_count() {
        for input in ["platform=[linux]", "platform=[a/b/c/d]"] {
            let err = parse_selector(&none(), input).unwrap_err();
            assert!(matches!(err, Error::UnrecognizedSelector(_)), "{input}");
        }

        let err = parse_selector(&none(), "platform=[linuxonly]").unwrap_err();
        assert!(err.to_string().contains("linuxonly"));
    }

    #[test]
    fn test_digest_single() {
        let a = Digest::canonical(b"A");
        let selection = parse_selector(&none(), &format!("digest=[{}]", a)).unwrap();
        assert!(selection.platforms.is_empty());
        assert_eq!(selection.digests, vec![a]);
    }

    #[test]
    fn test_digest_list_order() {
        let a = Digest::canonical(b"A");
        let b = Digest::canonical(b"B");
        let selection = parse_selector(&none(), &format!("digest=[{},{}]", a, b)).unwrap();
        assert_eq!(selection.digests, vec![a, b]);
    }

    #[test]
    fn test_digest_malformed_entry() {
        let err = parse_selector(&none(), "digest=[notadigest]").unwrap_err();
        assert!(matches!(err, Error::InvalidDigest(_)));
        assert!(err.to_string().contains("notadigest"));
    }

    #[test]
    fn test_mixed_clauses_preserve_order() {
        let a = Digest::canonical(b"A");
        let b = Digest::canonical(b"B");
        let input = format!(
            "platform=[linux/riscv,windows/riscv],arch=[amd64,ppc64le],digest=[{},{}]",
            a, b
        );
        let selection = parse_selector(&overrides("someOS", "someArch", ""), &input).unwrap();
        assert_eq!(
            selection.platforms,
            vec![
                Platform::new("linux", "riscv"),
                Platform::new("windows", "riscv"),
                Platform::new("someOS", "amd64"),
                Platform::new("someOS", "ppc64le"),
            ]
        );
        assert_eq!(selection.digests, vec![a, b]);
    }

    #[test]
    fn test_clause_encounter_order() {
        let selection = parse_selector(&none(), "arch=[amd64],platform=[linux/riscv]").unwrap();
        assert_eq!(
            selection.platforms,
            vec![
                Platform::new("hostos", "amd64"),
                Platform::new("linux", "riscv"),
            ]
        );
    }

    #[test]
    fn test_duplicate_clauses_not_deduplicated() {
        let selection = parse_selector(&none(), "arch=[amd64],arch=[amd64]").unwrap();
        assert_eq!(
            selection.platforms,
            vec![
                Platform::new("hostos", "amd64"),
                Platform::new("hostos", "amd64"),
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        let err = parse_selector(&none(), "").unwrap_err();
        assert!(matches!(err, Error::UnrecognizedSelector(_)));
        assert!(err.to_string().contains("unrecognized value"));
    }

    #[test]
    fn test_bare_commas() {
        for input in [",", ",,"] {
            let err = parse_selector(&none(), input).unwrap_err();
            assert!(matches!(err, Error::UnrecognizedSelector(_)), "{input}");
        }
    }

    #[test]
    fn test_bogus_bare_value() {
        let err = parse_selector(&none(), "vegetables=artichokes").unwrap_err();
        assert!(matches!(err, Error::UnrecognizedSelector(_)));
        assert!(err.to_string().contains("vegetables=artichokes"));
    }

    #[test]
    fn test_bogus_list_value() {
        for input in [
            "vegetables=[artichokes]",
            "brassica=[arugula,broccoli,cauliflower,daikon]",
        ] {
            let err = parse_selector(&none(), input).unwrap_err();
            assert!(matches!(err, Error::UnrecognizedSelector(_)), "{input}");
        }
    }

    #[test]
    fn test_missing_list_opener() {
        let err = parse_selector(&none(), "arch=amd64,s390x,ppc64le]").unwrap_err();
        assert!(matches!(err, Error::UnrecognizedSelector(_)));
    }

    #[test]
    fn test_missing_list_closer() {
        let err = parse_selector(&none(), "arch=[amd64,s390x,ppc64le").unwrap_err();
        assert!(matches!(err, Error::UnterminatedSelectorList(_)));
        assert!(err.to_string().contains("] not found"));
    }

    #[test]
    fn test_missing_closer_in_later_clause() {
        let err = parse_selector(&none(), "arch=[amd64],platform=[linux/riscv").unwrap_err();
        assert!(matches!(err, Error::UnterminatedSelectorList(_)));
        assert!(err.to_string().contains("] not found"));
    }

    #[test]
    fn test_junk_after_list() {
        let err = parse_selector(&none(), "arch=[amd64]junk").unwrap_err();
        assert!(matches!(err, Error::UnrecognizedSelector(_)));
    }

    #[test]
    fn test_trailing_comma() {
        let err = parse_selector(&none(), "arch=[amd64],").unwrap_err();
        assert!(matches!(err, Error::UnrecognizedSelector(_)));
    }

    #[test]
    fn test_resolve_fills_empty_fields_from_host() {
        let ov = overrides("someOS", "", "");
        let system = parse_selector(&ov, "system").unwrap();
        let resolved = ov.resolve(&system.platforms[0]);
        assert_eq!(resolved, Platform::new("someOS", "hostarch"));
    }

    #[test]
    fn test_effective_platform() {
        assert_eq!(
            none().effective_platform(),
            Platform::new("hostos", "hostarch")
        );
        assert_eq!(
            overrides("os", "arch", "v").effective_platform(),
            Platform::with_variant("os", "arch", "v")
        );
    }
}
