//! CLI commands for tool registrations (each tool owns one skills root).

use std::path::PathBuf;

use {anyhow::Result, clap::Subcommand, skillsyoga_config::ToolDefinition};

use crate::context::Context;

#[derive(Subcommand)]
pub enum ToolAction {
    /// List known tools in display order.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Enable a tool so its skills root is scanned.
    Enable { id: String },
    /// Disable a tool; its skills stay on disk.
    Disable { id: String },
    /// Register or update a custom tool.
    Add {
        /// Tool id (slugified).
        id: String,
        /// Display name.
        #[arg(long)]
        name: String,
        /// Directory holding the tool's skills.
        #[arg(long)]
        skills_path: String,
        /// Tool config directory (defaults to the skills path).
        #[arg(long)]
        config_path: Option<String>,
        /// The tool is a command-line tool.
        #[arg(long)]
        cli: bool,
    },
    /// Remove a custom tool registration.
    Remove { id: String },
    /// Persist a display order (unlisted tools follow alphabetically).
    Reorder {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Suggest skills directories found under a path.
    DiscoverRoots {
        dir: PathBuf,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Store the GitHub token (an empty value clears it).
    Token { token: String },
}

pub async fn handle_tools(action: ToolAction) -> Result<()> {
    let ctx = Context::load();
    let catalog = &ctx.catalog;

    match action {
        ToolAction::List { json } => {
            let tools = catalog.resolve_tools()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tools)?);
            } else {
                for tool in &tools {
                    let status = if tool.enabled {
                        "on "
                    } else {
                        "off"
                    };
                    let detected = if tool.detected {
                        ""
                    } else {
                        " (not detected)"
                    };
                    println!(
                        "  [{status}] {id:<16} {name}  {path}{detected}",
                        id = tool.id,
                        name = tool.name,
                        path = tool.skills_path.display(),
                    );
                }
            }
        },
        ToolAction::Enable { id } => {
            catalog.find_tool(&id)?;
            catalog.set_tool_enabled(&id, true)?;
            println!("Enabled {id}.");
        },
        ToolAction::Disable { id } => {
            catalog.find_tool(&id)?;
            catalog.set_tool_enabled(&id, false)?;
            println!("Disabled {id}.");
        },
        ToolAction::Add {
            id,
            name,
            skills_path,
            config_path,
            cli,
        } => {
            let tool = catalog.upsert_custom_tool(ToolDefinition {
                id,
                name,
                config_path: config_path.unwrap_or_else(|| skills_path.clone()),
                skills_path,
                cli,
            })?;
            println!("Saved {} ({}).", tool.id, tool.skills_path.display());
        },
        ToolAction::Remove { id } => {
            catalog.delete_custom_tool(&id)?;
            println!("Removed {id}; its skills were left on disk.");
        },
        ToolAction::Reorder { ids } => {
            catalog.reorder_tools(ids)?;
            println!("Order saved.");
        },
        ToolAction::DiscoverRoots { dir, json } => {
            let found = ctx.service()?.discover_skills_roots(&dir).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else if found.is_empty() {
                println!("No skills directories found under {}.", dir.display());
            } else {
                for candidate in &found {
                    println!(
                        "  {:>3}  {}",
                        candidate.skill_count,
                        candidate.path.display()
                    );
                }
            }
        },
        ToolAction::Token { token } => {
            catalog.set_github_token(&token)?;
            if catalog.has_github_token()? {
                println!("Token stored.");
            } else {
                println!("Token cleared.");
            }
        },
    }

    Ok(())
}
