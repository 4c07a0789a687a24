/// Config schema types (import pipeline, recoverable deletes, tool registrations).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsYogaConfig {
    pub import: ImportConfig,
    pub trash: TrashConfig,
    pub tools: ToolsConfig,
}

/// How remote skill sources are fetched and which ones are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Hosts a remote locator may point at. Defaults to `["github.com"]`.
    pub allowed_hosts: Vec<String>,
    /// URL schemes a remote locator may use. Defaults to `["https"]`.
    pub allowed_schemes: Vec<String>,
    /// Maximum directory depth searched for a manifest when no sub-path is given.
    pub scan_depth: usize,
    /// Snapshot strategy.
    pub fetcher: FetcherKind,
    /// Program used by the `git` fetcher.
    pub git_binary: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: vec!["github.com".into()],
            allowed_schemes: vec!["https".into()],
            scan_depth: 4,
            fetcher: FetcherKind::Git,
            git_binary: "git".into(),
        }
    }
}

/// Snapshot strategy for imports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    /// `git clone --depth 1`.
    #[default]
    Git,
    /// GitHub tarball download over HTTPS.
    Tarball,
}

/// Where deleted skill entries go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrashConfig {
    /// Prefer the desktop trash when the host provides one.
    pub use_host_trash: bool,
    /// Fallback holding area. Defaults to `<data_dir>/trash`.
    pub fallback_dir: Option<PathBuf>,
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            use_host_trash: true,
            fallback_dir: None,
        }
    }
}

/// Tool registrations declared in the config file, on top of the built-ins
/// and the ones stored in preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub custom: Vec<ToolDefinition>,
    /// Hide every built-in tool (useful for sandboxed setups and tests).
    pub disable_builtin: bool,
}

/// A tool whose skills directory is one Root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    /// Tool configuration directory; its existence marks the tool as detected.
    pub config_path: String,
    /// Directory holding the tool's skills.
    pub skills_path: String,
    #[serde(default)]
    pub cli: bool,
}
