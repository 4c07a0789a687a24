use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::path_guard::RelativePath;

// ── Roots and records ────────────────────────────────────────────────────────

/// A trusted base directory owned by one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub id: String,
    pub path: PathBuf,
}

impl Root {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

/// One discovered skill instance. Materialised fresh on every discovery
/// pass and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRecord {
    pub name: String,
    pub description: String,
    /// Absolute skill directory.
    pub path: PathBuf,
    pub root_id: String,
    /// Manifest modification time, milliseconds since the Unix epoch.
    pub modified_at_ms: u64,
}

impl SkillRecord {
    /// Grouping key: trimmed, lowercased name.
    pub fn group_key(&self) -> String {
        self.name.trim().to_lowercase()
    }
}

/// Records sharing a grouping key across one or more roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillGroup {
    /// Lowest `(root_id, path)` member.
    pub primary: SkillRecord,
    /// All members sorted by `(root_id, path)`; `members[0] == primary`.
    pub members: Vec<SkillRecord>,
    /// Distinct owning root ids, in member order.
    pub root_ids: Vec<String>,
    pub has_description_diff: bool,
}

impl SkillGroup {
    /// Derived grouping key, never stored.
    pub fn key(&self) -> String {
        self.primary.group_key()
    }
}

// ── File tree ────────────────────────────────────────────────────────────────

/// One file or directory inside a skill tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub relative_path: RelativePath,
    pub is_dir: bool,
}

/// What to do when a copy destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Replace the existing tree; the old one goes to the recoverable store.
    Overwrite,
    /// Leave the existing tree and copy under a timestamp-suffixed name.
    TimestampedCopy,
}

// ── Discovery output ─────────────────────────────────────────────────────────

/// A root that could not be scanned, or an entry that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryWarning {
    pub root_id: String,
    pub path: PathBuf,
    pub message: String,
}

/// Number of records one root contributed to a discovery pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCount {
    pub root_id: String,
    pub skills: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub groups: Vec<SkillGroup>,
    pub warnings: Vec<DiscoveryWarning>,
    /// One entry per input root, in input order.
    pub per_root: Vec<RootCount>,
}

/// A directory that holds skills, suggested as a tool's skills path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillsRootCandidate {
    pub path: PathBuf,
    pub skill_count: usize,
}
