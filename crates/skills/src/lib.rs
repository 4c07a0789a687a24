//! Skills engine: discovery and merging across roots, path containment,
//! per-skill file tree editing, recoverable deletion, and remote import.
//!
//! A skill is a directory holding a `SKILL.md` manifest plus any nested
//! files. Each tool owns one root directory of skills; the same skill may
//! exist in several roots and is merged by name on discovery.

pub mod discover;
pub mod error;
pub mod fetch;
mod fs_util;
pub mod import;
pub mod locks;
pub mod parse;
pub mod path_guard;
pub mod service;
pub mod shadow;
pub mod trash;
pub mod tree;
pub mod types;

pub use {
    error::{Error, ErrorKind, Result},
    import::{ImportPipeline, ImportRequest, SkillSelector},
    path_guard::{PathGuard, RelativePath},
    service::{SkillService, roots_from_tools},
    tree::FileTreeStore,
    types::{ConflictPolicy, DiscoveryReport, FileEntry, Root, SkillGroup, SkillRecord},
};
