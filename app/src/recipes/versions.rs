//! Recipe version history. Versions are appended by explicit request only;
//! once written, the only change a version sees is an approval record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use err_derive::Error;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::allergens::AllergenInfo;

use super::models::{Recipe, RecipeContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionLabel {
    major: u32,
    minor: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bump {
    Minor,
    Major,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionLabelError {
    #[error(display = "version label {:?} is not major.minor", _0)]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(display = "no version {} in this recipe", _0)]
pub struct UnknownVersion(pub VersionLabel);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

/// Recipe content as it stood when a version was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSnapshot {
    #[serde(flatten)]
    pub content: RecipeContent,
    #[serde(default)]
    pub allergen_info: AllergenInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeVersion {
    version: VersionLabel,
    created_at: DateTime<Utc>,
    #[serde(default)]
    created_by: String,
    #[serde(default)]
    changes: Vec<String>,
    #[serde(default)]
    reverted_from: Option<VersionLabel>,
    #[serde(default)]
    approval: Option<Approval>,
    snapshot: RecipeSnapshot,
}

impl VersionLabel {
    pub const FIRST: VersionLabel = VersionLabel { major: 1, minor: 0 };

    pub fn new(major: u32, minor: u32) -> Self {
        VersionLabel { major, minor }
    }

    pub fn bump(self, bump: Bump) -> Self {
        match bump {
            Bump::Minor => VersionLabel {
                major: self.major,
                minor: self.minor.saturating_add(1),
            },
            Bump::Major => VersionLabel {
                major: self.major.saturating_add(1),
                minor: 0,
            },
        }
    }
}

impl fmt::Display for VersionLabel {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for VersionLabel {
    type Err = VersionLabelError;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let malformed = || VersionLabelError::Malformed(src.to_string());
        let mut parts = src.trim().splitn(2, '.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(malformed)?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| malformed())?,
            None => 0,
        };
        Ok(VersionLabel { major, minor })
    }
}

impl Serialize for VersionLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(de::Error::custom)
    }
}

impl FromStr for Bump {
    type Err = anyhow::Error;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        match src.trim().to_lowercase().as_str() {
            "minor" => Ok(Bump::Minor),
            "major" => Ok(Bump::Major),
            other => Err(anyhow::anyhow!("unknown version bump {:?}", other)),
        }
    }
}

impl RecipeVersion {
    pub fn version(&self) -> VersionLabel {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn changes(&self) -> &[String] {
        &self.changes
    }

    pub fn reverted_from(&self) -> Option<VersionLabel> {
        self.reverted_from
    }

    pub fn approval(&self) -> Option<&Approval> {
        self.approval.as_ref()
    }

    pub fn snapshot(&self) -> &RecipeSnapshot {
        &self.snapshot
    }
}

impl Recipe {
    fn next_label(&self, bump: Bump) -> VersionLabel {
        self.latest_version()
            .map(|v| v.version.bump(bump))
            .unwrap_or(VersionLabel::FIRST)
    }

    fn snapshot(&self) -> RecipeSnapshot {
        RecipeSnapshot {
            content: self.content.clone(),
            allergen_info: self.allergen_info.clone(),
        }
    }

    /// Appends a version capturing the current content. The first version is
    /// always `1.0`.
    pub fn create_version(
        &mut self,
        bump: Bump,
        author: &str,
        changes: Vec<String>,
        now: DateTime<Utc>,
    ) -> &RecipeVersion {
        let version = RecipeVersion {
            version: self.next_label(bump),
            created_at: now,
            created_by: author.to_string(),
            changes,
            reverted_from: None,
            approval: None,
            snapshot: self.snapshot(),
        };
        self.versions.push(version);
        &self.versions[self.versions.len() - 1]
    }

    /// Restores the content captured by `label`, then records the restore as
    /// a new minor version pointing back at it. Derived costs and stage
    /// totals are left for the caller to recompute.
    pub fn revert_to(
        &mut self,
        label: VersionLabel,
        author: &str,
        now: DateTime<Utc>,
    ) -> Result<&RecipeVersion, UnknownVersion> {
        let snapshot = self
            .versions
            .iter()
            .find(|v| v.version == label)
            .map(|v| v.snapshot.clone())
            .ok_or(UnknownVersion(label))?;

        self.content = snapshot.content.clone();
        self.allergen_info = snapshot.allergen_info.clone();

        let version = RecipeVersion {
            version: self.next_label(Bump::Minor),
            created_at: now,
            created_by: author.to_string(),
            changes: vec![format!("Reverted to version {}", label)],
            reverted_from: Some(label),
            approval: None,
            snapshot,
        };
        self.versions.push(version);
        Ok(&self.versions[self.versions.len() - 1])
    }

    /// Records an approval on the latest version, taking a first version if
    /// there is none yet.
    pub fn attach_approval(&mut self, approval: Approval) -> VersionLabel {
        if self.versions.is_empty() {
            let now = approval.approved_at;
            let by = approval.approved_by.clone();
            self.create_version(Bump::Minor, &by, vec!["Approved".to_string()], now);
        }
        let last = self.versions.len() - 1;
        let latest = &mut self.versions[last];
        latest.approval = Some(approval);
        latest.version
    }
}
