//! Version-range matching for installed packages.
//!
//! Ranges are OR-combined: a version satisfies a list when it matches any
//! entry. Besides plain `semver` requirements, the pessimistic `~>`
//! operator used in package requirements is accepted:
//!
//! - `~> 1.13.2` means `>= 1.13.2, < 1.14.0`
//! - `~> 1.13` means `>= 1.13.0, < 2.0.0`
//! - `~> 1` means `>= 1.0.0`

use semver::{Version, VersionReq};

use crate::error::{Error, Result};

/// Parses a single range expression.
pub fn parse_requirement(expr: &str) -> Result<VersionReq> {
    let expr = expr.trim();
    let translated = match expr.strip_prefix("~>") {
        Some(rest) => pessimistic(rest.trim()).unwrap_or_else(|| expr.to_string()),
        None => expr.to_string(),
    };

    VersionReq::parse(&translated)
        .map_err(|e| Error::Config(format!("invalid version requirement '{}': {}", expr, e)))
}

/// Translates the operand of `~>` into a comparator pair.
fn pessimistic(operand: &str) -> Option<String> {
    let parts = operand
        .split('.')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    match parts.as_slice() {
        [major] => Some(format!(">={}.0.0", major)),
        [major, minor] => Some(format!(">={}.{}.0, <{}.0.0", major, minor, major + 1)),
        [major, minor, patch] => Some(format!(
            ">={}.{}.{}, <{}.{}.0",
            major,
            minor,
            patch,
            major,
            minor + 1
        )),
        _ => None,
    }
}

/// Parses an installed version, padding `1` and `1.13` to three components.
pub fn parse_version(version: &str) -> Option<Version> {
    let version = version.trim();
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let dots = version.matches('.').count();
    let padded = match dots {
        0 => format!("{}.0.0", version),
        1 => format!("{}.0", version),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

/// Returns true if `version` satisfies at least one of `ranges`.
///
/// Unparseable versions never satisfy.
pub fn satisfies(version: &str, ranges: &[&str]) -> Result<bool> {
    let Some(version) = parse_version(version) else {
        return Ok(false);
    };

    for range in ranges {
        if parse_requirement(range)?.matches(&version) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMBER_CLI: &[&str] = &["~>0.1.5", "~>0.2.0", "~>1.13"];

    #[test]
    fn matches_any_listed_range() {
        assert!(satisfies("0.1.5", EMBER_CLI).unwrap());
        assert!(satisfies("0.2.7", EMBER_CLI).unwrap());
        assert!(satisfies("1.13.2", EMBER_CLI).unwrap());
        assert!(satisfies("1.99.0", EMBER_CLI).unwrap());
    }

    #[test]
    fn rejects_versions_outside_every_range() {
        assert!(!satisfies("2.0.0", EMBER_CLI).unwrap());
        assert!(!satisfies("0.1.4", EMBER_CLI).unwrap());
        assert!(!satisfies("0.3.0", EMBER_CLI).unwrap());
        assert!(!satisfies("0.0.0", EMBER_CLI).unwrap());
    }

    #[test]
    fn three_part_pessimistic_pins_minor() {
        assert!(satisfies("0.0.13", &["~> 0.0.13"]).unwrap());
        assert!(satisfies("0.0.20", &["~> 0.0.13"]).unwrap());
        assert!(!satisfies("0.1.0", &["~> 0.0.13"]).unwrap());
        assert!(!satisfies("0.0.12", &["~> 0.0.13"]).unwrap());
    }

    #[test]
    fn single_part_pessimistic_is_a_floor() {
        assert!(satisfies("7.1.0", &["~> 2"]).unwrap());
        assert!(!satisfies("1.9.9", &["~> 2"]).unwrap());
    }

    #[test]
    fn plain_semver_requirements_pass_through() {
        assert!(satisfies("1.2.3", &["^1.0"]).unwrap());
        assert!(satisfies("1.2.3", &[">=1.2.0, <1.3.0"]).unwrap());
        assert!(!satisfies("2.0.0", &["^1.0"]).unwrap());
    }

    #[test]
    fn short_versions_are_padded() {
        assert!(satisfies("1.13", EMBER_CLI).unwrap());
        assert_eq!(parse_version("2"), Some(Version::new(2, 0, 0)));
    }

    #[test]
    fn garbage_version_never_satisfies() {
        assert!(!satisfies("latest", EMBER_CLI).unwrap());
        assert!(!satisfies("", EMBER_CLI).unwrap());
    }

    #[test]
    fn invalid_requirement_is_an_error() {
        assert!(matches!(satisfies("1.0.0", &["~> banana"]), Err(Error::Config(_))));
    }
}
