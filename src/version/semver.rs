//! Semantic version arithmetic
//!
//! The accepted grammar is deliberately narrow: `MAJOR.MINOR.PATCH` with an
//! optional `-PRERELEASE` tail. Prerelease labels are opaque strings and
//! compare byte-wise, not by SemVer 2.0 precedence rules.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::version::error::SemVerError;

/// Default version assigned to an identifier nobody has seen before
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Number of commit characters kept in a development suffix
const DEV_SHA_LEN: usize = 7;

static SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-(.+))?$").expect("semver pattern is valid")
});

/// Serialized as its canonical string; deserialization re-validates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl SemVer {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
        }
    }

    /// Parse a version string, rejecting anything outside `\d+.\d+.\d+(-.+)?`
    pub fn parse(text: &str) -> Result<Self, SemVerError> {
        let invalid = || SemVerError::InvalidFormat(text.to_string());

        let caps = SEMVER_RE.captures(text).ok_or_else(invalid)?;
        let component = |i: usize| -> Result<u64, SemVerError> {
            caps[i].parse::<u64>().map_err(|_| invalid())
        };

        Ok(Self {
            major: component(1)?,
            minor: component(2)?,
            patch: component(3)?,
            prerelease: caps.get(4).map(|m| m.as_str().to_string()),
        })
    }

    fn bump(&self, component: u64) -> Result<u64, SemVerError> {
        component
            .checked_add(1)
            .ok_or_else(|| SemVerError::Overflow(self.to_string()))
    }

    pub fn increment_patch(&self) -> Result<Self, SemVerError> {
        Ok(Self::new(self.major, self.minor, self.bump(self.patch)?))
    }

    pub fn increment_minor(&self) -> Result<Self, SemVerError> {
        Ok(Self::new(self.major, self.bump(self.minor)?, 0))
    }

    pub fn increment_major(&self) -> Result<Self, SemVerError> {
        Ok(Self::new(self.bump(self.major)?, 0, 0))
    }

    /// Derive a development build label from a commit SHA.
    ///
    /// Only the first seven characters of `sha` are kept; shorter values are
    /// used as-is.
    pub fn with_dev_suffix(&self, sha: &str) -> Self {
        let short_sha: String = sha.chars().take(DEV_SHA_LEN).collect();
        Self {
            major: self.major,
            minor: self.minor,
            patch: self.patch,
            prerelease: Some(format!("dev-{}", short_sha)),
        }
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl FromStr for SemVer {
    type Err = SemVerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<SemVer> for String {
    fn from(v: SemVer) -> Self {
        v.to_string()
    }
}

impl TryFrom<String> for SemVer {
    type Error = SemVerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SemVer::parse(&value)
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Order two versions.
///
/// A release sorts above any prerelease of the same core version; two
/// prereleases compare by ordinal byte order of their labels.
pub fn compare(a: &SemVer, b: &SemVer) -> Ordering {
    a.major
        .cmp(&b.major)
        .then(a.minor.cmp(&b.minor))
        .then(a.patch.cmp(&b.patch))
        .then_with(|| match (&a.prerelease, &b.prerelease) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => x.as_bytes().cmp(y.as_bytes()),
        })
}

/// Parse both sides and compare them
pub fn compare_str(a: &str, b: &str) -> Result<Ordering, SemVerError> {
    Ok(compare(&SemVer::parse(a)?, &SemVer::parse(b)?))
}

pub fn is_valid(text: &str) -> bool {
    SemVer::parse(text).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.2.3", SemVer::new(1, 2, 3))]
    #[case("0.0.0", SemVer::new(0, 0, 0))]
    #[case("10.20.30", SemVer::new(10, 20, 30))]
    #[case("1.2.3-dev-abc1234", SemVer { prerelease: Some("dev-abc1234".to_string()), ..SemVer::new(1, 2, 3) })]
    #[case("1.2.3-rc.1+build", SemVer { prerelease: Some("rc.1+build".to_string()), ..SemVer::new(1, 2, 3) })]
    #[case("01.2.3", SemVer::new(1, 2, 3))]
    fn parse_accepts_valid_versions(#[case] input: &str, #[case] expected: SemVer) {
        assert_eq!(SemVer::parse(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("1")]
    #[case("1.2")]
    #[case("v1.2.3")]
    #[case("1.2.3-")]
    #[case("1.2.3.4")]
    #[case("1.2.x")]
    #[case(" 1.2.3")]
    #[case("99999999999999999999.0.0")]
    fn parse_rejects_invalid_versions(#[case] input: &str) {
        assert!(matches!(
            SemVer::parse(input),
            Err(SemVerError::InvalidFormat(s)) if s == input
        ));
        assert!(!is_valid(input));
    }

    #[rstest]
    #[case("1.2.3")]
    #[case("0.1.0-alpha")]
    #[case("3.0.0-dev-abc1234")]
    fn display_round_trips_through_parse(#[case] input: &str) {
        let parsed = SemVer::parse(input).unwrap();
        assert_eq!(parsed.to_string(), input);
        assert_eq!(SemVer::parse(&parsed.to_string()).unwrap(), parsed);
    }

    #[rstest]
    #[case("1.2.3", "1.2.4", "1.3.0", "2.0.0")]
    #[case("1.2.3-beta", "1.2.4", "1.3.0", "2.0.0")]
    #[case("0.0.0", "0.0.1", "0.1.0", "1.0.0")]
    fn increments_reset_lower_components_and_clear_prerelease(
        #[case] current: &str,
        #[case] patch: &str,
        #[case] minor: &str,
        #[case] major: &str,
    ) {
        let v = SemVer::parse(current).unwrap();
        assert_eq!(v.increment_patch().unwrap().to_string(), patch);
        assert_eq!(v.increment_minor().unwrap().to_string(), minor);
        assert_eq!(v.increment_major().unwrap().to_string(), major);
    }

    #[rstest]
    #[case::patch("1.2.18446744073709551615", SemVer::increment_patch)]
    #[case::minor("1.18446744073709551615.0", SemVer::increment_minor)]
    #[case::major("18446744073709551615.0.0", SemVer::increment_major)]
    fn increment_at_component_limit_is_an_error(
        #[case] current: &str,
        #[case] increment: fn(&SemVer) -> Result<SemVer, SemVerError>,
    ) {
        let v = SemVer::parse(current).unwrap();
        assert_eq!(increment(&v), Err(SemVerError::Overflow(current.to_string())));
    }

    #[test]
    fn lower_components_at_limit_do_not_block_higher_bumps() {
        let v = SemVer::parse("1.18446744073709551615.18446744073709551615").unwrap();
        assert_eq!(v.increment_major().unwrap(), SemVer::new(2, 0, 0));
    }

    #[rstest]
    #[case("abc1234567890", "1.2.3-dev-abc1234")]
    #[case("abc12", "1.2.3-dev-abc12")]
    #[case("abc1234", "1.2.3-dev-abc1234")]
    fn with_dev_suffix_truncates_sha(#[case] sha: &str, #[case] expected: &str) {
        let v = SemVer::new(1, 2, 3);
        assert_eq!(v.with_dev_suffix(sha).to_string(), expected);
    }

    #[test]
    fn with_dev_suffix_replaces_existing_prerelease() {
        let v = SemVer::parse("2.0.0-rc1").unwrap();
        assert_eq!(v.with_dev_suffix("deadbeef").to_string(), "2.0.0-dev-deadbee");
    }

    #[rstest]
    #[case("1.2.3", "1.2.3-dev", Ordering::Greater)]
    #[case("1.2.3-dev", "1.2.3", Ordering::Less)]
    #[case("1.2.3", "1.2.3", Ordering::Equal)]
    #[case("1.10.0", "1.9.0", Ordering::Greater)]
    #[case("2.0.0", "1.99.99", Ordering::Greater)]
    #[case("1.2.3-alpha", "1.2.3-beta", Ordering::Less)]
    // ordinal comparison, not numeric-aware precedence
    #[case("1.2.3-rc.10", "1.2.3-rc.9", Ordering::Less)]
    #[case("1.2.3-B", "1.2.3-a", Ordering::Less)]
    fn compare_orders_versions(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(compare_str(a, b).unwrap(), expected);
    }

    #[test]
    fn compare_str_propagates_parse_errors() {
        assert!(compare_str("1.2.3", "latest").is_err());
    }

    #[test]
    fn ord_picks_release_over_prerelease() {
        let versions = ["1.0.0-dev-aaa", "1.0.0", "0.9.9"]
            .iter()
            .map(|v| SemVer::parse(v).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(versions.iter().max().unwrap().to_string(), "1.0.0");
    }
}
