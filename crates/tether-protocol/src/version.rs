//! Protocol version ordering and negotiation.
//!
//! MCP versions are date strings (`2025-06-18`), but the ordering here is
//! defined over dash- or dot-separated segments so numeric test versions
//! (`"1"`, `"3"`) and dates sort the same way. Numeric segments compare as
//! numbers; a textual segment sorts after any numeric one.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Newest protocol revision this crate understands.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol revisions this crate understands, oldest first.
pub const KNOWN_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment<'a> {
    Num(u64),
    Text(&'a str),
}

/// A single protocol revision identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolVersion(String);

impl ProtocolVersion {
    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidVersion`] for blank input or empty segments.
    pub fn parse(raw: impl Into<String>) -> ProtocolResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.split(['-', '.']).any(str::is_empty) {
            return Err(ProtocolError::InvalidVersion(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The newest revision this crate understands.
    pub fn latest() -> Self {
        Self(LATEST_PROTOCOL_VERSION.to_string())
    }

    /// Borrow the version string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        self.0.split(['-', '.']).map(|part| match part.parse::<u64>() {
            Ok(n) => Segment::Num(n),
            Err(_) => Segment::Text(part),
        })
    }
}

impl Ord for ProtocolVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments()
            .cmp(other.segments())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ProtocolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for ProtocolVersion {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ProtocolVersion> for String {
    fn from(value: ProtocolVersion) -> Self {
        value.0
    }
}

/// Inclusive range of protocol revisions one side supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct VersionRange {
    /// Oldest supported revision
    pub min: ProtocolVersion,
    /// Newest supported revision
    pub max: ProtocolVersion,
}

#[derive(Deserialize)]
struct RawRange {
    min: ProtocolVersion,
    max: ProtocolVersion,
}

impl TryFrom<RawRange> for VersionRange {
    type Error = ProtocolError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        Self::new(raw.min, raw.max)
    }
}

impl VersionRange {
    /// Build a range.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidVersionRange`] when `min > max`.
    pub fn new(min: ProtocolVersion, max: ProtocolVersion) -> ProtocolResult<Self> {
        if min > max {
            return Err(ProtocolError::InvalidVersionRange {
                min: min.0,
                max: max.0,
            });
        }
        Ok(Self { min, max })
    }

    /// Parse both bounds from strings.
    ///
    /// # Errors
    ///
    /// Returns an error if either bound is not a valid version or `min > max`.
    pub fn parse(min: &str, max: &str) -> ProtocolResult<Self> {
        Self::new(ProtocolVersion::parse(min)?, ProtocolVersion::parse(max)?)
    }

    /// A range holding exactly one revision.
    pub fn exactly(version: ProtocolVersion) -> Self {
        Self {
            min: version.clone(),
            max: version,
        }
    }

    /// Whether `version` lies inside this range.
    pub fn contains(&self, version: &ProtocolVersion) -> bool {
        &self.min <= version && version <= &self.max
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self {
            min: ProtocolVersion(KNOWN_PROTOCOL_VERSIONS[0].to_string()),
            max: ProtocolVersion::latest(),
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Pick the highest revision both sides support.
///
/// That is the lower of the two maxima, provided it is not older than either
/// side's minimum. Returns `None` when the ranges do not overlap.
pub fn negotiate(client: &VersionRange, server: &VersionRange) -> Option<ProtocolVersion> {
    let candidate = std::cmp::min(&client.max, &server.max);
    let floor = std::cmp::max(&client.min, &server.min);
    (candidate >= floor).then(|| candidate.clone())
}
