use {anyhow::Result, clap::Subcommand, skillsyoga_config::SkillsYogaConfig};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the config file path in use (or the one `init` would create).
    Path,
    /// Print the effective configuration as TOML.
    Show,
    /// Write a config file with default values.
    Init {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", skillsyoga_config::find_or_default_config_path().display());
        },
        ConfigAction::Show => {
            let config = skillsyoga_config::discover_and_load();
            print!("{}", toml::to_string_pretty(&config)?);
        },
        ConfigAction::Init { force } => {
            let path = skillsyoga_config::find_or_default_config_path();
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            let written = skillsyoga_config::save_config(&SkillsYogaConfig::default())?;
            println!("Wrote {}.", written.display());
        },
    }
    Ok(())
}
