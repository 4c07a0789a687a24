//! Recoverable deletion. Nothing in the engine removes user data outright:
//! deleted files, empty directories, whole skills and trees displaced by an
//! `Overwrite` copy all go through a [`RecoverableStore`].

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use {serde::Serialize, skillsyoga_config::TrashConfig};

use crate::{
    error::{Error, Result},
    fs_util,
};

/// Where a removed path went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoverableHandle {
    pub original: PathBuf,
    /// Holding location when known; the host trash does not report one.
    pub location: Option<PathBuf>,
}

/// Capability to move a path somewhere it can be recovered from.
pub trait RecoverableStore: Send + Sync {
    fn move_to_recoverable(&self, path: &Path) -> Result<RecoverableHandle>;
}

/// The platform trash (Finder, Recycle Bin, freedesktop trash).
#[cfg(feature = "host-trash")]
#[derive(Debug, Default, Clone, Copy)]
pub struct HostTrash;

#[cfg(feature = "host-trash")]
impl RecoverableStore for HostTrash {
    fn move_to_recoverable(&self, path: &Path) -> Result<RecoverableHandle> {
        trash::delete(path).map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to move {} to trash: {e}",
                path.display()
            )))
        })?;
        tracing::info!(path = %path.display(), "moved to host trash");
        Ok(RecoverableHandle {
            original: path.to_path_buf(),
            location: None,
        })
    }
}

/// Holding directory of `<UTC timestamp>-<name>` entries. Must live outside
/// every skills root.
#[derive(Debug, Clone)]
pub struct FallbackTrash {
    dir: PathBuf,
}

impl FallbackTrash {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RecoverableStore for FallbackTrash {
    fn move_to_recoverable(&self, path: &Path) -> Result<RecoverableHandle> {
        fs::symlink_metadata(path)
            .map_err(|_| Error::not_found(path.display().to_string()))?;
        fs::create_dir_all(&self.dir)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "entry".to_string());
        let location = fs_util::unique_path(&self.dir, &format!("{}-{name}", fs_util::timestamp()));
        fs_util::move_path(path, &location)?;

        tracing::info!(
            path = %path.display(),
            location = %location.display(),
            "moved to fallback trash"
        );
        Ok(RecoverableHandle {
            original: path.to_path_buf(),
            location: Some(location),
        })
    }
}

/// Host trash first; the fallback directory when the host facility fails or
/// is unavailable.
pub struct PreferHostTrash {
    host: Option<Arc<dyn RecoverableStore>>,
    fallback: FallbackTrash,
}

impl PreferHostTrash {
    pub fn new(host: Option<Arc<dyn RecoverableStore>>, fallback: FallbackTrash) -> Self {
        Self { host, fallback }
    }
}

impl RecoverableStore for PreferHostTrash {
    fn move_to_recoverable(&self, path: &Path) -> Result<RecoverableHandle> {
        if let Some(host) = &self.host {
            match host.move_to_recoverable(path) {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    tracing::warn!(path = %path.display(), %e, "host trash failed, using fallback directory");
                },
            }
        }
        self.fallback.move_to_recoverable(path)
    }
}

/// Build the store described by `config`. `default_fallback` is used when
/// the config names no fallback directory.
pub fn store_from_config(config: &TrashConfig, default_fallback: PathBuf) -> Arc<dyn RecoverableStore> {
    let fallback = FallbackTrash::new(config.fallback_dir.clone().unwrap_or(default_fallback));
    let host = host_trash(config.use_host_trash);
    Arc::new(PreferHostTrash::new(host, fallback))
}

#[cfg(feature = "host-trash")]
fn host_trash(enabled: bool) -> Option<Arc<dyn RecoverableStore>> {
    enabled.then(|| Arc::new(HostTrash) as Arc<dyn RecoverableStore>)
}

#[cfg(not(feature = "host-trash"))]
fn host_trash(_enabled: bool) -> Option<Arc<dyn RecoverableStore>> {
    None
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    impl RecoverableStore for FailingStore {
        fn move_to_recoverable(&self, _path: &Path) -> Result<RecoverableHandle> {
            Err(Error::message("no trash here"))
        }
    }

    #[test]
    fn fallback_keeps_content_recoverable() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("notes.md");
        fs::write(&file, "keep me").unwrap();

        let trash = FallbackTrash::new(tmp.path().join(".trash"));
        let handle = trash.move_to_recoverable(&file).unwrap();

        assert!(!file.exists());
        let location = handle.location.unwrap();
        assert!(location.starts_with(tmp.path().join(".trash")));
        assert!(
            location
                .file_name()
                .unwrap()
                .to_string_lossy()
                .ends_with("-notes.md")
        );
        assert_eq!(fs::read_to_string(location).unwrap(), "keep me");
    }

    #[test]
    fn fallback_uniquifies_same_second_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let trash = FallbackTrash::new(tmp.path().join(".trash"));
        let mut locations = Vec::new();
        for _ in 0..3 {
            let dir = tmp.path().join("assets");
            fs::create_dir_all(&dir).unwrap();
            locations.push(trash.move_to_recoverable(&dir).unwrap().location.unwrap());
        }
        locations.sort();
        locations.dedup();
        assert_eq!(locations.len(), 3);
    }

    #[test]
    fn fallback_missing_path_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let trash = FallbackTrash::new(tmp.path().join(".trash"));
        let err = trash.move_to_recoverable(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn failing_host_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "x").unwrap();

        let store = PreferHostTrash::new(
            Some(Arc::new(FailingStore)),
            FallbackTrash::new(tmp.path().join("held")),
        );
        let handle = store.move_to_recoverable(&file).unwrap();
        assert!(handle.location.unwrap().starts_with(tmp.path().join("held")));
    }
}
