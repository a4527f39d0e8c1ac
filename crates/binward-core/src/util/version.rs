//! Dotted four-field toolchain versions.
//!
//! Every comparison the policy engine performs is strictly lexicographic
//! across `(major, minor, build, revision)` in that order. The field order of
//! the struct is load-bearing: `PartialOrd`/`Ord` derive from it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A toolchain version such as `19.13.26115.0`.
///
/// Serializes as its dotted string form so policy files stay readable.
/// Missing trailing fields parse as zero (`"7.3.0"` is `7.3.0.0`); anything
/// non-numeric or empty is rejected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(try_from = "String", into = "String")]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

/// A version string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version string: {0:?}")]
pub struct VersionParseError(pub String);

impl ToolVersion {
    /// Smallest possible version; allow-list entries use it to exempt
    /// a library unconditionally.
    pub const ZERO: ToolVersion = ToolVersion::new(0, 0, 0, 0);

    /// Sentinel minimum for languages the policy has no entry for.
    /// Effectively unreachable, so unconfigured Unknown modules always flag.
    pub const MAX: ToolVersion = ToolVersion::new(u32::MAX, u32::MAX, u32::MAX, u32::MAX);

    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// True when `self` and `other` belong to the same toolchain release line
    /// (same major and minor field).
    pub fn same_line(&self, other: &ToolVersion) -> bool {
        self.major == other.major && self.minor == other.minor
    }
}

impl FromStr for ToolVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionParseError(s.to_string()));
        }

        let mut fields = [0u32; 4];
        let mut count = 0;
        for part in trimmed.split('.') {
            if count == 4 {
                return Err(VersionParseError(s.to_string()));
            }
            fields[count] = part
                .parse::<u32>()
                .map_err(|_| VersionParseError(s.to_string()))?;
            count += 1;
        }

        Ok(ToolVersion::new(fields[0], fields[1], fields[2], fields[3]))
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl TryFrom<String> for ToolVersion {
    type Error = VersionParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ToolVersion> for String {
    fn from(v: ToolVersion) -> String {
        v.to_string()
    }
}
