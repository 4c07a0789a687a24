//! Configuration loading, data directory resolution, the tool catalog, and
//! the file-backed preference store.
//!
//! Config files: `skillsyoga.toml`, `skillsyoga.yaml`, or `skillsyoga.json`,
//! searched in `./` then the user config directory. `${ENV_VAR}` placeholders
//! are substituted before parsing.

pub mod error;
pub mod loader;
pub mod paths;
pub mod schema;
pub mod state;
pub mod tools;

pub use {
    error::{Error, Result},
    loader::{
        clear_config_dir, clear_data_dir, config_dir, data_dir, discover_and_load,
        find_or_default_config_path, load_config, save_config, set_config_dir, set_data_dir,
    },
    paths::{expand_path, substitute_env},
    schema::{FetcherKind, ImportConfig, SkillsYogaConfig, ToolDefinition, ToolsConfig, TrashConfig},
    state::JsonFilePreferences,
    tools::{ToolCatalog, ToolInfo, ToolKind, built_in_tools},
};
