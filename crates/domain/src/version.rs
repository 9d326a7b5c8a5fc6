//! Semantic version value object
//!
//! Supports strict SemVer strings like "1.2.3", "1.0.0-beta.2", "2.0.0-rc.1+build.5".
//! Build metadata is carried for display but never takes part in ordering or equality.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Error when parsing a version string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The version string is empty
    #[error("Empty version string")]
    Empty,
    /// Invalid format - expected MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),
}

impl VersionError {
    fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }
}

/// Which numeric component to bump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionComponent {
    Major,
    Minor,
    Patch,
}

/// An immutable semantic version.
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    major: u64,
    minor: u64,
    patch: u64,
    pre_release: Option<String>,
    build_metadata: Option<String>,
}

impl SemanticVersion {
    /// Create a release version with no pre-release or build metadata
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: None,
            build_metadata: None,
        }
    }

    /// Attach a pre-release tag (e.g. "beta.1"), validating its identifiers.
    pub fn with_pre_release(mut self, pre_release: &str) -> Result<Self, VersionError> {
        validate_identifiers(pre_release, true)?;
        self.pre_release = Some(pre_release.to_string());
        Ok(self)
    }

    /// Attach build metadata (e.g. "build.42"), validating its identifiers.
    pub fn with_build_metadata(mut self, build: &str) -> Result<Self, VersionError> {
        validate_identifiers(build, false)?;
        self.build_metadata = Some(build.to_string());
        Ok(self)
    }

    /// Parse a version string using the strict SemVer grammar.
    ///
    /// Supported formats:
    /// - "X.Y.Z"
    /// - "X.Y.Z-pre.release"
    /// - "X.Y.Z+build.meta"
    /// - "X.Y.Z-pre+build"
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        if input.is_empty() {
            return Err(VersionError::Empty);
        }
        if input.trim() != input {
            return Err(VersionError::invalid(format!(
                "surrounding whitespace in '{}'",
                input
            )));
        }

        let (rest, build_metadata) = match input.split_once('+') {
            Some((rest, build)) => {
                validate_identifiers(build, false)?;
                (rest, Some(build.to_string()))
            }
            None => (input, None),
        };

        let (core, pre_release) = match rest.split_once('-') {
            Some((core, pre)) => {
                validate_identifiers(pre, true)?;
                (core, Some(pre.to_string()))
            }
            None => (rest, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionError::invalid(format!(
                "expected MAJOR.MINOR.PATCH in '{}'",
                input
            )));
        }

        Ok(Self {
            major: parse_numeric(parts[0], "major")?,
            minor: parse_numeric(parts[1], "minor")?,
            patch: parse_numeric(parts[2], "patch")?,
            pre_release,
            build_metadata,
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn pre_release(&self) -> Option<&str> {
        self.pre_release.as_deref()
    }

    pub fn build_metadata(&self) -> Option<&str> {
        self.build_metadata.as_deref()
    }

    pub fn is_pre_release(&self) -> bool {
        self.pre_release.is_some()
    }

    /// Two versions are compatible when they share a major version.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }

    pub fn is_newer_than(&self, other: &Self) -> bool {
        self > other
    }

    /// True when this version is at least `minimum`.
    pub fn satisfies_minimum(&self, minimum: &Self) -> bool {
        self >= minimum
    }

    /// Bump one component, resetting the lower ones to zero.
    ///
    /// Pre-release and build metadata are dropped: the result is always a release.
    /// Fails when the bumped component is already `u64::MAX`.
    pub fn increment(&self, component: VersionComponent) -> Result<Self, VersionError> {
        let bump = |value: u64, name: &str| {
            value
                .checked_add(1)
                .ok_or_else(|| VersionError::invalid(format!("{} component overflow", name)))
        };
        Ok(match component {
            VersionComponent::Major => Self::new(bump(self.major, "major")?, 0, 0),
            VersionComponent::Minor => Self::new(self.major, bump(self.minor, "minor")?, 0),
            VersionComponent::Patch => {
                Self::new(self.major, self.minor, bump(self.patch, "patch")?)
            }
        })
    }

    /// Three-way comparison as -1, 0 or 1.
    pub fn compare(&self, other: &Self) -> i32 {
        match self.cmp(other) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }
}

/// Parse both strings and compare them; fails if either is malformed.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, VersionError> {
    let a = SemanticVersion::parse(a)?;
    let b = SemanticVersion::parse(b)?;
    Ok(a.cmp(&b))
}

fn parse_numeric(part: &str, name: &str) -> Result<u64, VersionError> {
    if part.is_empty() {
        return Err(VersionError::invalid(format!("empty {} component", name)));
    }
    if !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::invalid(format!(
            "non-numeric {} component: '{}'",
            name, part
        )));
    }
    if part.len() > 1 && part.starts_with('0') {
        return Err(VersionError::invalid(format!(
            "leading zero in {} component: '{}'",
            name, part
        )));
    }
    part.parse()
        .map_err(|_| VersionError::invalid(format!("{} component overflow: '{}'", name, part)))
}

fn validate_identifiers(input: &str, is_pre_release: bool) -> Result<(), VersionError> {
    let label = if is_pre_release {
        "pre-release"
    } else {
        "build metadata"
    };
    if input.is_empty() {
        return Err(VersionError::invalid(format!("empty {}", label)));
    }
    for ident in input.split('.') {
        if ident.is_empty() {
            return Err(VersionError::invalid(format!(
                "empty identifier in {} '{}'",
                label, input
            )));
        }
        if !ident
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return Err(VersionError::invalid(format!(
                "invalid character in {} identifier '{}'",
                label, ident
            )));
        }
        // numeric pre-release identifiers must not carry leading zeros
        if is_pre_release
            && ident.len() > 1
            && ident.starts_with('0')
            && ident.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(VersionError::invalid(format!(
                "leading zero in pre-release identifier '{}'",
                ident
            )));
        }
    }
    Ok(())
}

fn is_numeric(ident: &str) -> bool {
    ident.bytes().all(|b| b.is_ascii_digit())
}

fn compare_pre_release(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (is_numeric(x), is_numeric(y)) {
                    // no leading zeros, so the longer digit string is the larger number
                    (true, true) => x.len().cmp(&y.len()).then_with(|| x.cmp(y)),
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => Ordering::Equal,
                // a release outranks any of its pre-releases
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => compare_pre_release(a, b),
            })
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl Hash for SemanticVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.pre_release.hash(state);
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{}", pre)?;
        }
        if let Some(build) = &self.build_metadata {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for SemanticVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
