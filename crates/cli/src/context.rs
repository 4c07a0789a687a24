use std::sync::Arc;

use {
    anyhow::Result,
    skillsyoga_config::{JsonFilePreferences, SkillsYogaConfig, ToolCatalog},
    skillsyoga_skills::{SkillService, roots_from_tools},
};

/// Loaded configuration plus the tool catalog backed by `state.json`.
pub struct Context {
    pub config: SkillsYogaConfig,
    pub catalog: ToolCatalog,
}

impl Context {
    pub fn load() -> Self {
        let config = skillsyoga_config::discover_and_load();
        let prefs = Arc::new(JsonFilePreferences::new(JsonFilePreferences::default_path()));
        let catalog = ToolCatalog::new(config.tools.clone(), prefs);
        Self { config, catalog }
    }

    /// Skill service over the enabled tools' roots.
    pub fn service(&self) -> Result<SkillService> {
        let roots = roots_from_tools(&self.catalog.enabled_tools()?);
        Ok(SkillService::from_config(&self.config, roots)?)
    }
}
