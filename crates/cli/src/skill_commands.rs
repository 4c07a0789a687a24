use std::{
    io::Read,
    path::{Path, PathBuf},
};

use {
    anyhow::{Result, bail},
    clap::{Subcommand, ValueEnum},
    skillsyoga_skills::{ConflictPolicy, SkillSelector, trash::RecoverableHandle},
    tokio_util::sync::CancellationToken,
    tracing::warn,
};

use crate::context::Context;

#[derive(Clone, Copy, ValueEnum)]
pub enum OnConflict {
    /// Replace the existing skill; the old copy goes to the trash.
    Overwrite,
    /// Install next to the existing skill under a timestamped name.
    Copy,
}

impl From<OnConflict> for ConflictPolicy {
    fn from(value: OnConflict) -> Self {
        match value {
            OnConflict::Overwrite => Self::Overwrite,
            OnConflict::Copy => Self::TimestampedCopy,
        }
    }
}

#[derive(Subcommand)]
pub enum SkillAction {
    /// List skills across enabled tools, merged by name.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the files inside a skill.
    Files { skill: PathBuf },
    /// Print a file from a skill.
    Read { skill: PathBuf, path: String },
    /// Write a file inside a skill (reads stdin when no text is given).
    Write {
        skill: PathBuf,
        path: String,
        text: Option<String>,
    },
    /// Create a directory inside a skill.
    Mkdir { skill: PathBuf, path: String },
    /// Rename or move an entry inside a skill.
    Mv {
        skill: PathBuf,
        from: String,
        to: String,
    },
    /// Move a file inside a skill to the trash.
    Rm { skill: PathBuf, path: String },
    /// Move an empty directory inside a skill to the trash.
    Rmdir { skill: PathBuf, path: String },
    /// Import a skill from a remote repository.
    Import {
        /// `owner/repo` or a repository URL.
        locator: String,
        /// Directory inside the repository holding the skill.
        #[arg(long, conflicts_with = "name")]
        path: Option<String>,
        /// Pick the skill whose manifest name matches.
        #[arg(long)]
        name: Option<String>,
        /// Tool id to install into.
        #[arg(long)]
        root: String,
        #[arg(long, value_enum)]
        on_conflict: OnConflict,
    },
    /// Copy a skill into another tool's root.
    Copy {
        skill: PathBuf,
        #[arg(long)]
        root: String,
        #[arg(long, value_enum)]
        on_conflict: OnConflict,
    },
    /// Create a new skill from manifest text (reads stdin when omitted).
    Create {
        #[arg(long)]
        root: String,
        text: Option<String>,
    },
    /// Print a skill's manifest, or replace it with `--set`.
    Manifest {
        skill: PathBuf,
        #[arg(long)]
        set: Option<String>,
    },
    /// Move a whole skill to the trash.
    Delete { skill: PathBuf },
}

fn text_or_stdin(text: Option<String>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

fn report_removed(handle: &RecoverableHandle) {
    match &handle.location {
        Some(location) => println!(
            "Moved {} to {}.",
            handle.original.display(),
            location.display()
        ),
        None => println!("Moved {} to the trash.", handle.original.display()),
    }
}

pub async fn handle_skills(action: SkillAction) -> Result<()> {
    let ctx = Context::load();
    let service = ctx.service()?;

    match action {
        SkillAction::List { json } => {
            let report = service.list_skills().await?;
            for warning in &report.warnings {
                warn!(root = %warning.root_id, path = %warning.path.display(), "{}", warning.message);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            if report.groups.is_empty() {
                println!("No skills found.");
                return Ok(());
            }
            for group in &report.groups {
                let marker = if group.has_description_diff {
                    " *"
                } else {
                    ""
                };
                println!(
                    "  {name:<28} [{roots}]{marker}",
                    name = group.primary.name,
                    roots = group.root_ids.join(", "),
                );
                if !group.primary.description.is_empty() {
                    println!("      {}", group.primary.description);
                }
            }
        },
        SkillAction::Files { skill } => {
            for entry in service.list_entries(&absolute(&skill)?).await? {
                let suffix = if entry.is_dir {
                    "/"
                } else {
                    ""
                };
                println!("{}{suffix}", entry.relative_path);
            }
        },
        SkillAction::Read { skill, path } => {
            print!("{}", service.read_entry(&absolute(&skill)?, &path).await?);
        },
        SkillAction::Write { skill, path, text } => {
            let text = text_or_stdin(text)?;
            service.write_entry(&absolute(&skill)?, &path, &text).await?;
            println!("Wrote {path}.");
        },
        SkillAction::Mkdir { skill, path } => {
            service.create_directory(&absolute(&skill)?, &path).await?;
            println!("Created {path}/.");
        },
        SkillAction::Mv { skill, from, to } => {
            let remap = service.rename_entry(&absolute(&skill)?, &from, &to).await?;
            println!("Renamed {} -> {}.", remap.from(), remap.to());
        },
        SkillAction::Rm { skill, path } => {
            report_removed(&service.delete_entry(&absolute(&skill)?, &path).await?);
        },
        SkillAction::Rmdir { skill, path } => {
            report_removed(
                &service
                    .delete_empty_directory(&absolute(&skill)?, &path)
                    .await?,
            );
        },
        SkillAction::Import {
            locator,
            path,
            name,
            root,
            on_conflict,
        } => {
            let selector = match (path, name) {
                (Some(path), None) => SkillSelector::SubPath(path),
                (None, Some(name)) => SkillSelector::ByName(name),
                (None, None) => SkillSelector::Auto,
                (Some(_), Some(_)) => bail!("--path and --name are mutually exclusive"),
            };

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let record = service
                .import_skill(&locator, selector, &root, on_conflict.into(), &cancel)
                .await?;
            println!("Imported {} into {}.", record.name, record.path.display());
        },
        SkillAction::Copy {
            skill,
            root,
            on_conflict,
        } => {
            let record = service
                .copy_skill(&absolute(&skill)?, &root, on_conflict.into())
                .await?;
            println!("Copied {} to {}.", record.name, record.path.display());
        },
        SkillAction::Create { root, text } => {
            let text = text_or_stdin(text)?;
            let record = service.create_skill(&root, &text).await?;
            println!("Created {} at {}.", record.name, record.path.display());
        },
        SkillAction::Manifest { skill, set } => {
            let skill = absolute(&skill)?;
            match set {
                Some(text) => {
                    let record = service.update_skill_manifest(&skill, &text).await?;
                    println!("Updated {}.", record.name);
                },
                None => print!("{}", service.read_skill_manifest(&skill).await?),
            }
        },
        SkillAction::Delete { skill } => {
            report_removed(&service.delete_skill(&absolute(&skill)?).await?);
        },
    }

    Ok(())
}
