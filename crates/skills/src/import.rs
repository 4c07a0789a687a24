use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    serde::{Deserialize, Serialize},
    skillsyoga_common::slugify,
    skillsyoga_config::{FetcherKind, ImportConfig},
    tokio_util::sync::CancellationToken,
};

use crate::{
    discover::load_skill,
    error::{Error, Result},
    fetch::{GitFetcher, LocatorPolicy, RemoteLocator, SnapshotFetcher, TarballFetcher},
    locks::DirLocks,
    parse::{MANIFEST_FILE, dir_display_name},
    path_guard::{PathGuard, RelativePath},
    trash::RecoverableStore,
    tree::FileTreeStore,
    types::{ConflictPolicy, Root, SkillRecord},
};

/// Default breadth-first search depth when locating a skill in a snapshot.
pub const DEFAULT_SCAN_DEPTH: usize = 4;

/// Which directory of the snapshot is the skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum SkillSelector {
    /// First directory holding a manifest, breadth first.
    Auto,
    /// Exactly this directory, relative to the snapshot root.
    SubPath(String),
    /// A directory with this base name holding a manifest, else `Auto`.
    ByName(String),
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub locator: String,
    pub selector: SkillSelector,
    pub target: Root,
    pub conflict_policy: ConflictPolicy,
}

/// Fetch, locate, copy, re-parse.
pub struct ImportPipeline {
    policy: LocatorPolicy,
    fetcher: Arc<dyn SnapshotFetcher>,
    scan_depth: usize,
    locks: DirLocks,
    trash: Arc<dyn RecoverableStore>,
}

impl ImportPipeline {
    pub fn new(
        policy: LocatorPolicy,
        fetcher: Arc<dyn SnapshotFetcher>,
        locks: DirLocks,
        trash: Arc<dyn RecoverableStore>,
    ) -> Self {
        Self {
            policy,
            fetcher,
            scan_depth: DEFAULT_SCAN_DEPTH,
            locks,
            trash,
        }
    }

    pub fn from_config(
        config: &ImportConfig,
        locks: DirLocks,
        trash: Arc<dyn RecoverableStore>,
    ) -> Self {
        let fetcher: Arc<dyn SnapshotFetcher> = match config.fetcher {
            FetcherKind::Git => Arc::new(GitFetcher::new(&config.git_binary)),
            FetcherKind::Tarball => Arc::new(TarballFetcher::default()),
        };
        Self::new(LocatorPolicy::from_config(config), fetcher, locks, trash)
            .with_scan_depth(config.scan_depth)
    }

    #[must_use]
    pub fn with_scan_depth(mut self, depth: usize) -> Self {
        self.scan_depth = depth;
        self
    }

    /// Import one skill into `request.target`.
    ///
    /// Everything is validated before the fetch starts. The snapshot lives in
    /// a temporary directory removed on return; the target root is only
    /// touched once a skill has been located, and then only through an
    /// atomic move.
    pub async fn import(&self, request: &ImportRequest, cancel: &CancellationToken) -> Result<SkillRecord> {
        let locator = self.policy.validate(&request.locator)?;
        validate_selector(&request.selector)?;
        if request.target.id.trim().is_empty() {
            return Err(Error::validation("target root has an empty id"));
        }

        let snapshot = snapshot_dir_in(&std::env::temp_dir())?;
        let snapshot_root = snapshot.path().join("snapshot");

        tokio::select! {
            res = self.fetcher.fetch(&locator, &snapshot_root) => res?,
            () = cancel.cancelled() => {
                tracing::info!(url = %locator.url, "import cancelled during fetch");
                return Err(Error::Cancelled);
            },
        }
        if !snapshot_root.is_dir() {
            return Err(Error::Fetch(format!("{} produced no snapshot", locator.url)));
        }

        let record = self
            .install_from_snapshot(&locator, &snapshot_root, request, cancel)
            .await;
        if let Err(e) = snapshot.close() {
            tracing::warn!(%e, "failed to remove import snapshot");
        }
        record
    }

    async fn install_from_snapshot(
        &self,
        locator: &RemoteLocator,
        snapshot_root: &Path,
        request: &ImportRequest,
        cancel: &CancellationToken,
    ) -> Result<SkillRecord> {
        let root = snapshot_root.to_path_buf();
        let selector = request.selector.clone();
        let depth = self.scan_depth;
        let (skill_dir, is_snapshot_root) = tokio::task::spawn_blocking(move || {
            let guard = PathGuard::new(&root)?;
            let dir = locate_skill(&guard, &selector, depth)?;
            let is_root = dir.as_path() == guard.root();
            Ok::<_, Error>((dir, is_root))
        })
        .await??;
        let base_name = if is_snapshot_root {
            locator.repo.clone()
        } else {
            dir_display_name(&skill_dir)
        };
        let dest_name = slugify(&base_name);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::fs::create_dir_all(&request.target.path).await?;

        let store = FileTreeStore::at(&skill_dir, self.locks.clone(), Arc::clone(&self.trash))?;
        let landed = store
            .copy_into_cancellable(&request.target.path, &dest_name, request.conflict_policy, cancel)
            .await?;

        let record = load_skill(landed.clone(), request.target.id.clone()).await?;
        tracing::info!(
            url = %locator.url,
            skill = %record.name,
            root = %request.target.id,
            path = %landed.display(),
            "imported skill"
        );
        Ok(record)
    }
}

/// Scratch directory the snapshot is fetched into; removed on drop.
fn snapshot_dir_in(parent: &Path) -> Result<tempfile::TempDir> {
    Ok(tempfile::Builder::new()
        .prefix("skillsyoga-")
        .tempdir_in(parent)?)
}

fn validate_selector(selector: &SkillSelector) -> Result<()> {
    match selector {
        SkillSelector::Auto => Ok(()),
        SkillSelector::SubPath(raw) => RelativePath::parse(raw).map(|_| ()),
        SkillSelector::ByName(name) if name.trim().is_empty() => {
            Err(Error::validation("skill name must not be empty"))
        },
        SkillSelector::ByName(_) => Ok(()),
    }
}

/// Resolve the skill directory inside a snapshot.
pub fn locate_skill(guard: &PathGuard, selector: &SkillSelector, max_depth: usize) -> Result<PathBuf> {
    match selector {
        SkillSelector::SubPath(raw) => {
            let resolved = guard.resolve(raw)?;
            if resolved.absolute.join(MANIFEST_FILE).is_file() {
                Ok(resolved.absolute)
            } else {
                Err(Error::not_found(format!("no {MANIFEST_FILE} at '{}'", raw.trim())))
            }
        },
        SkillSelector::ByName(name) => {
            let name = name.trim();
            breadth_first(guard.root(), max_depth, |dir| {
                dir.file_name().is_some_and(|n| n == name) && dir.join(MANIFEST_FILE).is_file()
            })
            .or_else(|| breadth_first(guard.root(), max_depth, has_manifest))
            .ok_or_else(|| Error::not_found(format!("skill '{name}' in repository")))
        },
        SkillSelector::Auto => breadth_first(guard.root(), max_depth, has_manifest).ok_or_else(|| {
            Error::not_found(format!(
                "no {MANIFEST_FILE} within {max_depth} levels; specify a sub-path"
            ))
        }),
    }
}

fn has_manifest(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

/// First directory matching `accept`, level by level, children in name
/// order. Hidden directories and symlinks are not entered.
fn breadth_first(root: &Path, max_depth: usize, accept: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    let mut queue = VecDeque::from([(root.to_path_buf(), 0usize)]);
    while let Some((dir, depth)) = queue.pop_front() {
        if accept(&dir) {
            return Some(dir);
        }
        if depth >= max_depth {
            continue;
        }
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        let mut children: Vec<PathBuf> = entries
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .map(|e| e.path())
            .collect();
        children.sort();
        queue.extend(children.into_iter().map(|c| (c, depth + 1)));
    }
    None
}
