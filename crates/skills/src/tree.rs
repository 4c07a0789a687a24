//! Per-skill file tree operations.
//!
//! Every path is resolved through the skill directory's [`PathGuard`] before
//! storage is touched, every mutation holds the directory's lock, and nothing
//! is ever hard-deleted: removals go through the [`RecoverableStore`].

use std::{
    cmp::Ordering,
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::Arc,
};

use {tokio_util::sync::CancellationToken, walkdir::WalkDir};

use crate::{
    error::{Error, Result},
    fs_util,
    locks::DirLocks,
    path_guard::{PathGuard, RelativePath},
    shadow::PathRemap,
    trash::{RecoverableHandle, RecoverableStore},
    types::{ConflictPolicy, FileEntry},
};

pub struct FileTreeStore {
    guard: PathGuard,
    locks: DirLocks,
    trash: Arc<dyn RecoverableStore>,
}

impl FileTreeStore {
    /// Open the skill at `skill_dir`, which must be an existing directory
    /// strictly inside `root`.
    pub fn open(
        root: &Path,
        skill_dir: &Path,
        locks: DirLocks,
        trash: Arc<dyn RecoverableStore>,
    ) -> Result<Self> {
        let root_guard = PathGuard::new(root)?;
        let resolved = root_guard.resolve_for_mutation(&skill_dir.to_string_lossy())?;
        if !resolved.absolute.is_dir() {
            return Err(Error::not_found(format!(
                "skill directory {}",
                skill_dir.display()
            )));
        }
        Self::at(&resolved.absolute, locks, trash)
    }

    /// Open a directory whose containment the caller has already checked,
    /// such as a skill located inside a fetched snapshot.
    pub fn at(skill_dir: &Path, locks: DirLocks, trash: Arc<dyn RecoverableStore>) -> Result<Self> {
        Ok(Self {
            guard: PathGuard::new(skill_dir)?,
            locks,
            trash,
        })
    }

    /// Canonical skill directory.
    pub fn skill_dir(&self) -> &Path {
        self.guard.root()
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    /// Every non-hidden entry, depth first: at each level directories come
    /// before files, then names sort lexicographically.
    pub async fn list(&self) -> Result<Vec<FileEntry>> {
        let dir = self.skill_dir().to_path_buf();
        tokio::task::spawn_blocking(move || list_tree(&dir)).await?
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>> {
        let resolved = self.guard.resolve(relative)?;
        match tokio::fs::metadata(&resolved.absolute).await {
            Ok(meta) if meta.is_dir() => Err(Error::validation(format!(
                "'{}' is a directory",
                resolved.relative
            ))),
            Ok(_) => Ok(tokio::fs::read(&resolved.absolute).await?),
            Err(_) => Err(Error::not_found(resolved.relative.to_string())),
        }
    }

    pub async fn read_to_string(&self, relative: &str) -> Result<String> {
        let bytes = self.read(relative).await?;
        String::from_utf8(bytes)
            .map_err(|_| Error::validation(format!("'{}' is not UTF-8 text", relative.trim())))
    }

    /// Write `content`, creating missing parent directories.
    pub async fn write(&self, relative: &str, content: impl AsRef<[u8]>) -> Result<()> {
        let resolved = self.guard.resolve_for_mutation(relative)?;
        let _lock = self.locks.lock(self.skill_dir()).await;

        if resolved.absolute.is_dir() {
            return Err(Error::validation(format!(
                "'{}' is a directory",
                resolved.relative
            )));
        }
        if let Some(parent) = resolved.absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved.absolute, content).await?;
        tracing::debug!(skill = %self.skill_dir().display(), path = %resolved.relative, "wrote entry");
        Ok(())
    }

    /// Idempotent: an existing directory is success, an existing file is a
    /// conflict.
    pub async fn create_directory(&self, relative: &str) -> Result<()> {
        let resolved = self.guard.resolve(relative)?;
        let _lock = self.locks.lock(self.skill_dir()).await;

        match tokio::fs::symlink_metadata(&resolved.absolute).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(Error::conflict(resolved.relative.to_string())),
            Err(_) => {
                tokio::fs::create_dir_all(&resolved.absolute).await?;
                Ok(())
            },
        }
    }

    /// Move `from` to `to` in one filesystem rename. The returned remap is
    /// what callers apply to any state keyed by relative path.
    pub async fn rename(&self, from: &str, to: &str) -> Result<PathRemap> {
        let source = self.guard.resolve_for_mutation(from)?;
        let target = self.guard.resolve_for_mutation(to)?;
        let _lock = self.locks.lock(self.skill_dir()).await;

        let meta = tokio::fs::symlink_metadata(&source.absolute)
            .await
            .map_err(|_| Error::not_found(source.relative.to_string()))?;
        if tokio::fs::symlink_metadata(&target.absolute).await.is_ok() {
            return Err(Error::conflict(target.relative.to_string()));
        }
        if meta.is_dir() && target.relative.starts_with(&source.relative) {
            return Err(Error::invalid_path(format!(
                "cannot move '{}' inside itself",
                source.relative
            )));
        }
        if let Some(parent) = target.absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&source.absolute, &target.absolute).await?;

        tracing::info!(
            skill = %self.skill_dir().display(),
            from = %source.relative,
            to = %target.relative,
            "renamed entry"
        );
        Ok(PathRemap::new(source.relative, target.relative))
    }

    /// Move a file to the recoverable store. Directories are refused here;
    /// see [`FileTreeStore::delete_empty_directory`].
    pub async fn delete(&self, relative: &str) -> Result<RecoverableHandle> {
        let resolved = self.guard.resolve_for_mutation(relative)?;
        let _lock = self.locks.lock(self.skill_dir()).await;

        let meta = tokio::fs::symlink_metadata(&resolved.absolute)
            .await
            .map_err(|_| Error::not_found(resolved.relative.to_string()))?;
        if meta.is_dir() {
            return Err(Error::validation(format!(
                "'{}' is a directory; delete its contents, then the empty directory",
                resolved.relative
            )));
        }
        self.move_to_recoverable(resolved.absolute).await
    }

    /// Move an empty directory to the recoverable store.
    pub async fn delete_empty_directory(&self, relative: &str) -> Result<RecoverableHandle> {
        let resolved = self.guard.resolve_for_mutation(relative)?;
        let _lock = self.locks.lock(self.skill_dir()).await;

        let meta = tokio::fs::symlink_metadata(&resolved.absolute)
            .await
            .map_err(|_| Error::not_found(resolved.relative.to_string()))?;
        if !meta.is_dir() {
            return Err(Error::validation(format!(
                "'{}' is not a directory",
                resolved.relative
            )));
        }
        let mut entries = tokio::fs::read_dir(&resolved.absolute).await?;
        if entries.next_entry().await?.is_some() {
            return Err(Error::NotEmpty(resolved.relative.to_string()));
        }
        self.move_to_recoverable(resolved.absolute).await
    }

    /// Move the whole skill directory to the recoverable store.
    pub async fn delete_all(self) -> Result<RecoverableHandle> {
        let dir = self.skill_dir().to_path_buf();
        let _lock = self.locks.lock(&dir).await;
        self.move_to_recoverable(dir).await
    }

    async fn move_to_recoverable(&self, path: PathBuf) -> Result<RecoverableHandle> {
        let trash = Arc::clone(&self.trash);
        tokio::task::spawn_blocking(move || trash.move_to_recoverable(&path)).await?
    }

    pub async fn copy_into(
        &self,
        dest_root: &Path,
        dest_relative: &str,
        policy: ConflictPolicy,
    ) -> Result<PathBuf> {
        self.copy_into_cancellable(dest_root, dest_relative, policy, &CancellationToken::new())
            .await
    }

    /// Copy the whole tree to `dest_relative` under `dest_root`.
    ///
    /// The tree is staged in a hidden sibling and moved into place with one
    /// rename, so the destination never holds a half-written copy.
    /// Cancellation is honoured until that final move starts. Returns the
    /// directory the tree landed in, which differs from the requested one
    /// for [`ConflictPolicy::TimestampedCopy`] when the destination exists.
    pub async fn copy_into_cancellable(
        &self,
        dest_root: &Path,
        dest_relative: &str,
        policy: ConflictPolicy,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let dest_guard = PathGuard::new(dest_root)?;
        let target = dest_guard.resolve_for_mutation(dest_relative)?.absolute;
        let source = self.skill_dir().to_path_buf();
        if target.starts_with(&source) || source.starts_with(&target) {
            return Err(Error::invalid_path(format!(
                "{} overlaps the source skill {}",
                target.display(),
                source.display()
            )));
        }

        let parent = target
            .parent()
            .ok_or_else(|| Error::invalid_path(target.display().to_string()))?
            .to_path_buf();
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::invalid_path(target.display().to_string()))?;

        let _locks = self.locks.lock_pair(&source, &target).await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::fs::create_dir_all(&parent).await?;
        let staging = fs_util::unique_path(&parent, &format!(".{name}.staging-{}", fs_util::timestamp()));
        let copy_src = source.clone();
        let copy_dst = staging.clone();
        let copy_cancel = cancel.clone();
        let copied =
            tokio::task::spawn_blocking(move || fs_util::copy_tree(&copy_src, &copy_dst, &copy_cancel))
                .await?;
        if let Err(e) = copied {
            discard_staging(&staging).await;
            return Err(e);
        }
        if cancel.is_cancelled() {
            discard_staging(&staging).await;
            return Err(Error::Cancelled);
        }

        // Commit. Not cancellable from here on.
        let exists = tokio::fs::symlink_metadata(&target).await.is_ok();
        let final_dir = match (exists, policy) {
            (false, _) => {
                tokio::fs::rename(&staging, &target).await?;
                target
            },
            (true, ConflictPolicy::TimestampedCopy) => {
                let dir = fs_util::unique_path(&parent, &format!("{name}-{}", fs_util::timestamp()));
                tokio::fs::rename(&staging, &dir).await?;
                dir
            },
            (true, ConflictPolicy::Overwrite) => {
                self.replace(&staging, &target, &parent, &name).await?;
                target
            },
        };

        tracing::info!(
            from = %source.display(),
            to = %final_dir.display(),
            ?policy,
            "copied skill tree"
        );
        Ok(final_dir)
    }

    /// Swap `staging` in for `target`; the previous tree goes to the
    /// recoverable store.
    async fn replace(&self, staging: &Path, target: &Path, parent: &Path, name: &str) -> Result<()> {
        let displaced = fs_util::unique_path(parent, &format!(".{name}.replaced-{}", fs_util::timestamp()));
        if let Err(e) = tokio::fs::rename(target, &displaced).await {
            discard_staging(staging).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(staging, target).await {
            if let Err(restore) = tokio::fs::rename(&displaced, target).await {
                tracing::warn!(path = %displaced.display(), %restore, "failed to restore displaced tree");
            }
            discard_staging(staging).await;
            return Err(e.into());
        }
        if let Err(e) = self.move_to_recoverable(displaced.clone()).await {
            tracing::warn!(path = %displaced.display(), %e, "replaced tree left in place");
        }
        Ok(())
    }
}

async fn discard_staging(staging: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(staging).await {
        tracing::warn!(path = %staging.display(), %e, "failed to remove staging directory");
    }
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

fn list_tree(dir: &Path) -> Result<Vec<FileEntry>> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by(|a, b| match (a.file_type().is_dir(), b.file_type().is_dir()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.file_name().cmp(b.file_name()),
        })
        .into_iter()
        .filter_entry(|e| !is_hidden(e.file_name()));

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        entries.push(FileEntry {
            relative_path: RelativePath::from_path(relative)?,
            is_dir: entry.file_type().is_dir(),
        });
    }
    Ok(entries)
}
