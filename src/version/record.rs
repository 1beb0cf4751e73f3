//! Version records and the identifiers that key them

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::error::{IdentifierError, IncrementKindError, SemVerError};
use crate::version::semver::SemVer;

/// Composite key `{group_id}-{name}`.
///
/// The group is everything before the first dash, so it never contains a
/// dash itself; the name keeps any remaining dashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    group_id: String,
    name: String,
}

impl Identifier {
    pub fn parse(identifier: &str) -> Result<Self, IdentifierError> {
        let invalid = || IdentifierError::InvalidFormat(identifier.to_string());

        let (group_id, name) = identifier.split_once('-').ok_or_else(invalid)?;
        if group_id.is_empty() || name.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            group_id: group_id.to_string(),
            name: name.to_string(),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix shared by every identifier in this identifier's group
    pub fn group_prefix(&self) -> String {
        group_prefix(&self.group_id)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.group_id, self.name)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub fn format_identifier(group_id: &str, name: &str) -> String {
    format!("{}-{}", group_id, name)
}

pub fn group_prefix(group_id: &str) -> String {
    format!("{}-", group_id)
}

/// Version state for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub group_id: String,
    pub name: String,
    pub current: SemVer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_repo: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl VersionRecord {
    pub fn new(identifier: &Identifier, current: SemVer, last_updated: DateTime<Utc>) -> Self {
        Self {
            group_id: identifier.group_id().to_string(),
            name: identifier.name().to_string(),
            current,
            source_repo: None,
            last_updated,
        }
    }

    pub fn identifier(&self) -> String {
        format_identifier(&self.group_id, &self.name)
    }

    /// Copy of this record carrying a new version, stamped at `now`
    pub fn with_version(&self, current: SemVer, now: DateTime<Utc>) -> Self {
        Self {
            current,
            last_updated: now,
            ..self.clone()
        }
    }
}

/// Identifier-keyed collection of records
pub type VersionMap = BTreeMap<String, VersionRecord>;

/// Single document holding every record of the durable tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionsDocument {
    #[serde(default)]
    pub versions: VersionMap,
    pub last_updated: DateTime<Utc>,
}

impl VersionsDocument {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            versions: VersionMap::new(),
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncrementKind {
    #[default]
    Patch,
    Minor,
    Major,
}

impl IncrementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncrementKind::Patch => "patch",
            IncrementKind::Minor => "minor",
            IncrementKind::Major => "major",
        }
    }

    pub fn apply(&self, version: &SemVer) -> Result<SemVer, SemVerError> {
        match self {
            IncrementKind::Patch => version.increment_patch(),
            IncrementKind::Minor => version.increment_minor(),
            IncrementKind::Major => version.increment_major(),
        }
    }
}

impl fmt::Display for IncrementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncrementKind {
    type Err = IncrementKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "patch" => Ok(IncrementKind::Patch),
            "minor" => Ok(IncrementKind::Minor),
            "major" => Ok(IncrementKind::Major),
            _ => Err(IncrementKindError(s.to_string())),
        }
    }
}
