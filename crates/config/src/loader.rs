use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use tracing::{debug, warn};

use crate::{
    error::{Context, Error, Result},
    paths::substitute_env,
    schema::SkillsYogaConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "skillsyoga.toml",
    "skillsyoga.yaml",
    "skillsyoga.yml",
    "skillsyoga.json",
];

static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);
static DATA_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "skillsyoga")
}

fn read_override(slot: &RwLock<Option<PathBuf>>) -> Option<PathBuf> {
    slot.read().ok().and_then(|guard| guard.clone())
}

fn write_override(slot: &RwLock<Option<PathBuf>>, value: Option<PathBuf>) {
    if let Ok(mut guard) = slot.write() {
        *guard = value;
    }
}

/// Override the config directory for the rest of the process.
pub fn set_config_dir(path: PathBuf) {
    write_override(&CONFIG_DIR_OVERRIDE, Some(path));
}

pub fn clear_config_dir() {
    write_override(&CONFIG_DIR_OVERRIDE, None);
}

/// Override the data directory for the rest of the process.
pub fn set_data_dir(path: PathBuf) {
    write_override(&DATA_DIR_OVERRIDE, Some(path));
}

pub fn clear_data_dir() {
    write_override(&DATA_DIR_OVERRIDE, None);
}

/// Returns the user-global config directory (`~/.config/skillsyoga/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    read_override(&CONFIG_DIR_OVERRIDE)
        .or_else(|| project_dirs().map(|d| d.config_dir().to_path_buf()))
}

/// Returns the data directory holding `state.json` and the fallback trash.
pub fn data_dir() -> PathBuf {
    read_override(&DATA_DIR_OVERRIDE)
        .or_else(|| project_dirs().map(|d| d.data_dir().to_path_buf()))
        .unwrap_or_else(|| PathBuf::from(".skillsyoga"))
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<SkillsYogaConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./skillsyoga.{toml,yaml,yml,json}` (project-local)
/// 2. `<config_dir>/skillsyoga.{toml,yaml,yml,json}` (user-global)
///
/// Returns `SkillsYogaConfig::default()` if no config file is found or the
/// one found cannot be parsed.
pub fn discover_and_load() -> SkillsYogaConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    SkillsYogaConfig::default()
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skillsyoga.toml")
}

/// Serialize `config` to TOML and write it to the user-global config path.
///
/// Creates parent directories if needed. Returns the path written to.
pub fn save_config(config: &SkillsYogaConfig) -> Result<PathBuf> {
    let path = find_or_default_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(path)
}

fn parse_config(raw: &str, path: &Path) -> Result<SkillsYogaConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::validation(format!(
            "unsupported config format: .{ext}"
        ))),
    }
}
