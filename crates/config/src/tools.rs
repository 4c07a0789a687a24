//! Tool catalog: built-in and custom tool registrations, each owning one
//! skills directory (a Root). Enable flags, custom registrations and display
//! order live in the injected [`PreferenceStore`].

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use {
    serde::{Deserialize, Serialize},
    skillsyoga_common::{PreferenceStore, PreferenceStoreExt, slugify},
    tracing::info,
};

use crate::{
    error::{Error, Result},
    paths::expand_path,
    schema::{ToolDefinition, ToolsConfig},
};

pub const TOOL_TOGGLES_KEY: &str = "tool_toggles";
pub const CUSTOM_TOOLS_KEY: &str = "custom_tools";
pub const TOOL_ORDER_KEY: &str = "tool_order";
pub const GITHUB_TOKEN_KEY: &str = "github_token";

/// Where a tool registration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Builtin,
    Custom,
}

/// A tool registration resolved against the local filesystem and preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub id: String,
    pub name: String,
    pub kind: ToolKind,
    pub config_path: PathBuf,
    pub skills_path: PathBuf,
    pub detected: bool,
    pub enabled: bool,
    pub cli: bool,
}

fn builtin(id: &str, name: &str, config_path: &str, skills_path: &str, cli: bool) -> ToolDefinition {
    ToolDefinition {
        id: id.into(),
        name: name.into(),
        config_path: config_path.into(),
        skills_path: skills_path.into(),
        cli,
    }
}

/// Tools known out of the box.
pub fn built_in_tools() -> Vec<ToolDefinition> {
    vec![
        builtin("cursor", "Cursor", "~/.cursor", "~/.cursor/skills", false),
        builtin("gemini", "Gemini CLI", "~/.gemini", "~/.gemini/skills", true),
        builtin(
            "antigravity",
            "Antigravity",
            "~/.gemini/antigravity",
            "~/.gemini/antigravity/skills",
            false,
        ),
        builtin("trae", "Trae", "~/.trae", "~/.trae/skills", false),
        builtin("claude-code", "Claude Code", "~/.claude", "~/.claude/skills", true),
        builtin("codex", "Codex", "~/.codex", "~/.codex/skills", true),
        builtin("openclaw", "OpenClaw", "~/.openclaw", "~/.openclaw/skills", false),
        builtin(
            "opencode",
            "OpenCode",
            "~/.config/opencode",
            "~/.config/opencode/skills",
            true,
        ),
        builtin("goose", "Goose", "~/.config/goose", "~/.config/goose/skills", true),
        builtin("letta", "Letta", "~/.letta", "~/.letta/skills", true),
        builtin("amp", "Amp", "~/.config/amp", "~/.config/agents/skills", true),
        builtin(
            "github-copilot",
            "GitHub Copilot",
            "~/.copilot",
            "~/.copilot/skills",
            false,
        ),
        builtin(
            "windsurf",
            "Windsurf",
            "~/.codeium/windsurf",
            "~/.codeium/windsurf/skills",
            false,
        ),
        builtin("cline", "Cline", "~/.cline", "~/.cline/skills", false),
        builtin("roo-code", "Roo Code", "~/.roo", "~/.roo/skills", false),
        builtin("marscode", "MarsCode", "~/.marscode", "~/.marscode/skills", false),
        builtin("tongyi-lingma", "Tongyi Lingma", "~/.lingma", "~/.lingma/skills", false),
        builtin("baidu-comate", "Baidu Comate", "~/.comate", "~/.comate/skills", false),
    ]
}

/// Resolves tool registrations into [`ToolInfo`]s and persists tool preferences.
pub struct ToolCatalog {
    config: ToolsConfig,
    prefs: Arc<dyn PreferenceStore>,
}

impl ToolCatalog {
    pub fn new(config: ToolsConfig, prefs: Arc<dyn PreferenceStore>) -> Self {
        Self { config, prefs }
    }

    fn builtins(&self) -> Vec<ToolDefinition> {
        if self.config.disable_builtin {
            Vec::new()
        } else {
            built_in_tools()
        }
    }

    fn stored_custom_tools(&self) -> Result<Vec<ToolDefinition>> {
        Ok(self.prefs.get_as(CUSTOM_TOOLS_KEY)?.unwrap_or_default())
    }

    fn toggles(&self) -> Result<HashMap<String, bool>> {
        Ok(self.prefs.get_as(TOOL_TOGGLES_KEY)?.unwrap_or_default())
    }

    fn order(&self) -> Result<Vec<String>> {
        Ok(self.prefs.get_as(TOOL_ORDER_KEY)?.unwrap_or_default())
    }

    /// All registrations: built-ins, then config-file customs, then stored
    /// customs. A stored custom replaces a config-file custom with the same id.
    fn definitions(&self) -> Result<Vec<(ToolDefinition, ToolKind)>> {
        let mut defs: Vec<(ToolDefinition, ToolKind)> = self
            .builtins()
            .into_iter()
            .map(|d| (d, ToolKind::Builtin))
            .collect();

        let customs = self
            .config
            .custom
            .iter()
            .cloned()
            .chain(self.stored_custom_tools()?);
        for custom in customs {
            if let Some(slot) = defs
                .iter_mut()
                .find(|(d, kind)| d.id == custom.id && *kind == ToolKind::Custom)
            {
                slot.0 = custom;
            } else if !defs.iter().any(|(d, _)| d.id == custom.id) {
                defs.push((custom, ToolKind::Custom));
            }
        }
        Ok(defs)
    }

    /// Resolve every registration, sorted by the persisted order; tools not
    /// in the stored order go last, alphabetically by name.
    pub fn resolve_tools(&self) -> Result<Vec<ToolInfo>> {
        let toggles = self.toggles()?;
        let order = self.order()?;

        let mut tools: Vec<ToolInfo> = self
            .definitions()?
            .into_iter()
            .map(|(def, kind)| resolve(&def, kind, &toggles))
            .collect();

        tools.sort_by(|a, b| {
            let pos_a = order.iter().position(|id| id == &a.id);
            let pos_b = order.iter().position(|id| id == &b.id);
            match (pos_a, pos_b) {
                (Some(i), Some(j)) => i.cmp(&j),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.name.cmp(&b.name),
            }
        });
        Ok(tools)
    }

    /// Enabled tools only, in display order.
    pub fn enabled_tools(&self) -> Result<Vec<ToolInfo>> {
        Ok(self
            .resolve_tools()?
            .into_iter()
            .filter(|t| t.enabled)
            .collect())
    }

    pub fn find_tool(&self, tool_id: &str) -> Result<ToolInfo> {
        self.resolve_tools()?
            .into_iter()
            .find(|t| t.id == tool_id)
            .ok_or_else(|| Error::not_found(format!("tool not found: {tool_id}")))
    }

    pub fn set_tool_enabled(&self, tool_id: &str, enabled: bool) -> Result<()> {
        let mut toggles = self.toggles()?;
        toggles.insert(tool_id.to_string(), enabled);
        self.prefs.set_as(TOOL_TOGGLES_KEY, &toggles)?;
        Ok(())
    }

    /// Register or replace a custom tool. The id is slugified and may not
    /// shadow a built-in.
    pub fn upsert_custom_tool(&self, tool: ToolDefinition) -> Result<ToolInfo> {
        let id = slugify(&tool.id);
        if built_in_tools().iter().any(|b| b.id == id) {
            return Err(Error::validation(
                "custom tool id conflicts with a built-in integration",
            ));
        }
        if tool.skills_path.trim().is_empty() {
            return Err(Error::validation("custom tool needs a skills path"));
        }

        let clean = ToolDefinition { id, ..tool };
        let mut stored = self.stored_custom_tools()?;
        match stored.iter_mut().find(|t| t.id == clean.id) {
            Some(existing) => *existing = clean.clone(),
            None => stored.push(clean.clone()),
        }
        self.prefs.set_as(CUSTOM_TOOLS_KEY, &stored)?;
        info!(tool = %clean.id, "custom tool saved");
        self.find_tool(&clean.id)
    }

    /// Drop a stored custom tool and its toggle. Skills on disk stay put.
    pub fn delete_custom_tool(&self, tool_id: &str) -> Result<()> {
        let mut stored = self.stored_custom_tools()?;
        let before = stored.len();
        stored.retain(|t| t.id != tool_id);
        if stored.len() == before {
            return Err(Error::not_found(format!("custom tool not found: {tool_id}")));
        }
        self.prefs.set_as(CUSTOM_TOOLS_KEY, &stored)?;

        let mut toggles = self.toggles()?;
        if toggles.remove(tool_id).is_some() {
            self.prefs.set_as(TOOL_TOGGLES_KEY, &toggles)?;
        }
        info!(tool = %tool_id, "custom tool removed");
        Ok(())
    }

    pub fn reorder_tools(&self, order: Vec<String>) -> Result<()> {
        self.prefs.set_as(TOOL_ORDER_KEY, &order)?;
        Ok(())
    }

    /// Store (or clear, when blank) the GitHub token.
    pub fn set_github_token(&self, token: &str) -> Result<()> {
        let cleaned = token.trim();
        if cleaned.is_empty() {
            self.prefs.delete(GITHUB_TOKEN_KEY)?;
        } else {
            self.prefs.set_as(GITHUB_TOKEN_KEY, &cleaned)?;
        }
        Ok(())
    }

    pub fn has_github_token(&self) -> Result<bool> {
        let token: Option<String> = self.prefs.get_as(GITHUB_TOKEN_KEY)?;
        Ok(token.is_some_and(|t| !t.trim().is_empty()))
    }
}

fn resolve(def: &ToolDefinition, kind: ToolKind, toggles: &HashMap<String, bool>) -> ToolInfo {
    let config_path = expand_path(&def.config_path);
    let skills_path = expand_path(&def.skills_path);
    let detected = config_path.exists() || skills_path.exists();
    let enabled = toggles.get(&def.id).copied().unwrap_or(detected);

    ToolInfo {
        id: def.id.clone(),
        name: def.name.clone(),
        kind,
        config_path,
        skills_path,
        detected,
        enabled,
        cli: def.cli,
    }
}
