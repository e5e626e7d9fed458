//! Semantic version triples and the version-range grammar used during
//! resolution.
//!
//! Ranges are whitespace-separated constraints that are ANDed together:
//! `^1.2.3`, `~1.2.3`, `>=1.0.0 <2.0.0`, `=1.2.3`, a bare `1.2.3` (exact),
//! or `*` (any).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("expected MAJOR.MINOR.PATCH, got '{0}'")]
    Malformed(String),
    #[error("invalid numeric component '{0}'")]
    BadNumber(String),
    #[error("empty version range")]
    EmptyRange,
    #[error("invalid range constraint '{0}'")]
    BadConstraint(String),
}

/// A `MAJOR.MINOR.PATCH` triple. Ordering is numeric, component-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionError::Malformed(s.to_string()));
        }
        let num = |p: &str| -> Result<u64, VersionError> {
            if p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()) {
                return Err(VersionError::BadNumber(p.to_string()));
            }
            p.parse().map_err(|_| VersionError::BadNumber(p.to_string()))
        };
        Ok(Version {
            major: num(parts[0])?,
            minor: num(parts[1])?,
            patch: num(parts[2])?,
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Version::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> String {
        v.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Exact,
    Greater,
    GreaterEq,
    Less,
    LessEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn matches(&self, v: &Version) -> bool {
        match self.op {
            Op::Exact => *v == self.version,
            Op::Greater => *v > self.version,
            Op::GreaterEq => *v >= self.version,
            Op::Less => *v < self.version,
            Op::LessEq => *v <= self.version,
        }
    }
}

/// A parsed version range. An empty comparator list means `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReq {
    comparators: Vec<Comparator>,
}

impl VersionReq {
    /// Matches every version.
    pub fn any() -> Self {
        VersionReq {
            comparators: Vec::new(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(VersionError::EmptyRange);
        }
        if input == "*" {
            return Ok(VersionReq::any());
        }

        let mut comparators = Vec::new();
        for token in input.split_whitespace() {
            parse_constraint(token, &mut comparators)?;
        }
        Ok(VersionReq { comparators })
    }

    pub fn matches(&self, v: &Version) -> bool {
        self.comparators.iter().all(|c| c.matches(v))
    }
}

fn parse_constraint(token: &str, out: &mut Vec<Comparator>) -> Result<(), VersionError> {
    let bad = || VersionError::BadConstraint(token.to_string());

    if let Some(rest) = token.strip_prefix('^') {
        let base = Version::parse(rest).map_err(|_| bad())?;
        // ^0.0.Z pins the exact version; ^0.Y.Z allows patch bumps only.
        let upper = if base.major > 0 {
            Version::new(base.major + 1, 0, 0)
        } else if base.minor > 0 {
            Version::new(0, base.minor + 1, 0)
        } else {
            out.push(Comparator {
                op: Op::Exact,
                version: base,
            });
            return Ok(());
        };
        out.push(Comparator {
            op: Op::GreaterEq,
            version: base,
        });
        out.push(Comparator {
            op: Op::Less,
            version: upper,
        });
        return Ok(());
    }

    if let Some(rest) = token.strip_prefix('~') {
        let base = Version::parse(rest).map_err(|_| bad())?;
        out.push(Comparator {
            op: Op::GreaterEq,
            version: base,
        });
        out.push(Comparator {
            op: Op::Less,
            version: Version::new(base.major, base.minor + 1, 0),
        });
        return Ok(());
    }

    let (op, rest) = if let Some(rest) = token.strip_prefix(">=") {
        (Op::GreaterEq, rest)
    } else if let Some(rest) = token.strip_prefix("<=") {
        (Op::LessEq, rest)
    } else if let Some(rest) = token.strip_prefix('>') {
        (Op::Greater, rest)
    } else if let Some(rest) = token.strip_prefix('<') {
        (Op::Less, rest)
    } else if let Some(rest) = token.strip_prefix('=') {
        (Op::Exact, rest)
    } else {
        (Op::Exact, token)
    };

    let version = Version::parse(rest).map_err(|_| bad())?;
    out.push(Comparator { op, version });
    Ok(())
}

impl FromStr for VersionReq {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionReq::parse(s)
    }
}
