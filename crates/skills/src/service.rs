//! Command facade consumed by the CLI (or any other front end). Every call
//! that names a skill directory first checks that it lies inside one of the
//! known roots, whatever the caller claims.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    skillsyoga_common::slugify,
    skillsyoga_config::{SkillsYogaConfig, ToolInfo, data_dir},
    tokio_util::sync::CancellationToken,
};

use crate::{
    discover::{FsSkillDiscoverer, SkillDiscoverer, discover_skills_roots, load_skill},
    error::{Error, Result},
    fs_util,
    import::{ImportPipeline, ImportRequest, SkillSelector},
    locks::DirLocks,
    parse::{self, MANIFEST_FILE, dir_display_name},
    path_guard::PathGuard,
    shadow::PathRemap,
    trash::{FallbackTrash, RecoverableHandle, RecoverableStore, store_from_config},
    tree::FileTreeStore,
    types::{ConflictPolicy, DiscoveryReport, FileEntry, Root, SkillRecord, SkillsRootCandidate},
};

pub struct SkillService {
    roots: Vec<Root>,
    locks: DirLocks,
    trash: Arc<dyn RecoverableStore>,
    import: ImportPipeline,
}

impl SkillService {
    pub fn new(
        roots: Vec<Root>,
        locks: DirLocks,
        trash: Arc<dyn RecoverableStore>,
        import: ImportPipeline,
    ) -> Self {
        Self {
            roots,
            locks,
            trash,
            import,
        }
    }

    /// Wire the service from configuration. The fallback trash directory
    /// must not sit inside any root.
    pub fn from_config(config: &SkillsYogaConfig, roots: Vec<Root>) -> Result<Self> {
        let fallback = config
            .trash
            .fallback_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("trash"));
        ensure_outside_roots(&fallback, &roots)?;

        let locks = DirLocks::new();
        let trash = store_from_config(&config.trash, fallback);
        let import = ImportPipeline::from_config(&config.import, locks.clone(), Arc::clone(&trash));
        Ok(Self::new(roots, locks, trash, import))
    }

    /// Like [`SkillService::from_config`] but never uses the host trash.
    pub fn with_fallback_trash(
        config: &SkillsYogaConfig,
        roots: Vec<Root>,
        trash_dir: PathBuf,
    ) -> Result<Self> {
        ensure_outside_roots(&trash_dir, &roots)?;
        let locks = DirLocks::new();
        let trash: Arc<dyn RecoverableStore> = Arc::new(FallbackTrash::new(trash_dir));
        let import = ImportPipeline::from_config(&config.import, locks.clone(), Arc::clone(&trash));
        Ok(Self::new(roots, locks, trash, import))
    }

    pub fn roots(&self) -> &[Root] {
        &self.roots
    }

    pub fn root(&self, id: &str) -> Result<&Root> {
        self.roots
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found(format!("root '{id}'")))
    }

    // ── Listing ──────────────────────────────────────────────────────────────

    pub async fn list_skills(&self) -> Result<DiscoveryReport> {
        FsSkillDiscoverer::new(self.roots.clone()).discover().await
    }

    pub async fn discover_skills_roots(&self, dir: &Path) -> Result<Vec<SkillsRootCandidate>> {
        let dir = dir.to_path_buf();
        Ok(tokio::task::spawn_blocking(move || discover_skills_roots(&dir)).await?)
    }

    // ── Entries ──────────────────────────────────────────────────────────────

    pub async fn list_entries(&self, skill_path: &Path) -> Result<Vec<FileEntry>> {
        self.store(skill_path)?.1.list().await
    }

    pub async fn read_entry(&self, skill_path: &Path, relative: &str) -> Result<String> {
        self.store(skill_path)?.1.read_to_string(relative).await
    }

    pub async fn write_entry(&self, skill_path: &Path, relative: &str, text: &str) -> Result<()> {
        self.store(skill_path)?.1.write(relative, text).await
    }

    pub async fn create_directory(&self, skill_path: &Path, relative: &str) -> Result<()> {
        self.store(skill_path)?.1.create_directory(relative).await
    }

    pub async fn rename_entry(&self, skill_path: &Path, from: &str, to: &str) -> Result<PathRemap> {
        self.store(skill_path)?.1.rename(from, to).await
    }

    pub async fn delete_entry(&self, skill_path: &Path, relative: &str) -> Result<RecoverableHandle> {
        self.store(skill_path)?.1.delete(relative).await
    }

    pub async fn delete_empty_directory(
        &self,
        skill_path: &Path,
        relative: &str,
    ) -> Result<RecoverableHandle> {
        self.store(skill_path)?.1.delete_empty_directory(relative).await
    }

    // ── Skills ───────────────────────────────────────────────────────────────

    pub async fn import_skill(
        &self,
        locator: &str,
        selector: SkillSelector,
        target_root: &str,
        conflict_policy: ConflictPolicy,
        cancel: &CancellationToken,
    ) -> Result<SkillRecord> {
        let request = ImportRequest {
            locator: locator.to_string(),
            selector,
            target: self.root(target_root)?.clone(),
            conflict_policy,
        };
        self.import.import(&request, cancel).await
    }

    /// Copy a skill into another root under its directory name.
    pub async fn copy_skill(
        &self,
        source_skill_path: &Path,
        target_root: &str,
        conflict_policy: ConflictPolicy,
    ) -> Result<SkillRecord> {
        let (_, store) = self.store(source_skill_path)?;
        let target = self.root(target_root)?;
        tokio::fs::create_dir_all(&target.path).await?;

        let name = dir_display_name(store.skill_dir());
        let landed = store.copy_into(&target.path, &name, conflict_policy).await?;
        load_skill(landed, target.id.clone()).await
    }

    /// Create a skill directory named after the manifest's name, suffixed
    /// `-1`, `-2`, … when taken.
    pub async fn create_skill(&self, root_id: &str, manifest_text: &str) -> Result<SkillRecord> {
        let root = self.root(root_id)?;
        tokio::fs::create_dir_all(&root.path).await?;
        let guard = PathGuard::new(&root.path)?;

        let meta = parse::parse_manifest(manifest_text, "skill");
        let _lock = self.locks.lock(guard.root()).await;
        let dir = fs_util::unique_path(guard.root(), &slugify(&meta.name));
        tokio::fs::create_dir(&dir).await?;
        tokio::fs::write(dir.join(MANIFEST_FILE), manifest_text).await?;

        tracing::info!(root = %root.id, path = %dir.display(), "created skill");
        load_skill(dir, root.id.clone()).await
    }

    pub async fn read_skill_manifest(&self, skill_path: &Path) -> Result<String> {
        self.read_entry(skill_path, MANIFEST_FILE).await
    }

    pub async fn update_skill_manifest(&self, skill_path: &Path, text: &str) -> Result<SkillRecord> {
        let (root, store) = self.store(skill_path)?;
        store.write(MANIFEST_FILE, text).await?;
        load_skill(store.skill_dir().to_path_buf(), root.id.clone()).await
    }

    /// Move the whole skill directory to the recoverable store.
    pub async fn delete_skill(&self, skill_path: &Path) -> Result<RecoverableHandle> {
        let (root, store) = self.store(skill_path)?;
        let handle = store.delete_all().await?;
        tracing::info!(root = %root.id, path = %skill_path.display(), "deleted skill");
        Ok(handle)
    }

    /// The tree store for `skill_path` and the root that owns it.
    fn store(&self, skill_path: &Path) -> Result<(&Root, FileTreeStore)> {
        for root in &self.roots {
            let Ok(guard) = PathGuard::new(&root.path) else {
                continue;
            };
            if guard.contains(skill_path) {
                let store = FileTreeStore::open(
                    &root.path,
                    skill_path,
                    self.locks.clone(),
                    Arc::clone(&self.trash),
                )?;
                return Ok((root, store));
            }
        }
        Err(Error::invalid_path(format!(
            "{} is not inside a known skills root",
            skill_path.display()
        )))
    }
}

/// One root per tool, in catalog order.
pub fn roots_from_tools(tools: &[ToolInfo]) -> Vec<Root> {
    tools
        .iter()
        .map(|t| Root::new(t.id.clone(), t.skills_path.clone()))
        .collect()
}

fn ensure_outside_roots(dir: &Path, roots: &[Root]) -> Result<()> {
    for root in roots {
        let Ok(guard) = PathGuard::new(&root.path) else {
            continue;
        };
        if guard.contains(dir) {
            return Err(Error::validation(format!(
                "trash directory {} is inside skills root '{}'",
                dir.display(),
                root.id
            )));
        }
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        tmp: tempfile::TempDir,
        service: SkillService,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let roots = vec![
            Root::new("codex", tmp.path().join("codex")),
            Root::new("cursor", tmp.path().join("cursor")),
        ];
        for root in &roots {
            std::fs::create_dir_all(&root.path).unwrap();
        }
        let service = SkillService::with_fallback_trash(
            &SkillsYogaConfig::default(),
            roots,
            tmp.path().join("trash"),
        )
        .unwrap();
        Fixture { tmp, service }
    }

    #[tokio::test]
    async fn create_skill_uniquifies_directory() {
        let f = fixture();
        let text = "---\nname: PDF Tools\ndescription: d\n---\n";
        let first = f.service.create_skill("codex", text).await.unwrap();
        let second = f.service.create_skill("codex", text).await.unwrap();
        assert!(first.path.ends_with("pdf-tools"));
        assert!(second.path.ends_with("pdf-tools-1"));
        assert_eq!(second.name, "PDF Tools");

        let report = f.service.list_skills().await.unwrap();
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].members.len(), 2);
    }

    #[tokio::test]
    async fn unknown_root_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.service.create_skill("nope", "# x").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn paths_outside_roots_are_rejected() {
        let f = fixture();
        let outside = f.tmp.path().join("elsewhere");
        std::fs::create_dir_all(&outside).unwrap();
        assert!(matches!(
            f.service.list_entries(&outside).await,
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            f.service.list_entries(&f.tmp.path().join("codex")).await,
            Err(Error::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn manifest_update_is_reflected() {
        let f = fixture();
        let created = f.service.create_skill("codex", "# Draft\n").await.unwrap();
        assert_eq!(created.name, "Draft");

        let updated = f
            .service
            .update_skill_manifest(&created.path, "---\nname: Final\ndescription: done\n---\n")
            .await
            .unwrap();
        assert_eq!(updated.name, "Final");
        assert_eq!(updated.description, "done");
        assert!(
            f.service
                .read_skill_manifest(&created.path)
                .await
                .unwrap()
                .contains("Final")
        );
    }

    #[tokio::test]
    async fn copy_skill_between_roots() {
        let f = fixture();
        let created = f.service.create_skill("codex", "# Shared\n").await.unwrap();
        let copied = f
            .service
            .copy_skill(&created.path, "cursor", ConflictPolicy::Overwrite)
            .await
            .unwrap();
        assert_eq!(copied.root_id, "cursor");
        assert_eq!(copied.name, "Shared");

        let report = f.service.list_skills().await.unwrap();
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].root_ids, vec!["codex", "cursor"]);
    }

    #[tokio::test]
    async fn delete_skill_moves_to_trash() {
        let f = fixture();
        let created = f.service.create_skill("codex", "# Gone\n").await.unwrap();
        let handle = f.service.delete_skill(&created.path).await.unwrap();
        assert!(!created.path.exists());
        assert!(handle.location.unwrap().join(MANIFEST_FILE).is_file());
    }

    #[test]
    fn trash_inside_root_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("codex")).unwrap();
        let result = SkillService::with_fallback_trash(
            &SkillsYogaConfig::default(),
            vec![Root::new("codex", tmp.path().join("codex"))],
            tmp.path().join("codex/.trash"),
        );
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn roots_follow_tool_order() {
        let tools = vec![
            ToolInfo {
                id: "b".into(),
                name: "B".into(),
                kind: skillsyoga_config::ToolKind::Custom,
                config_path: PathBuf::from("/cfg/b"),
                skills_path: PathBuf::from("/skills/b"),
                detected: true,
                enabled: true,
                cli: false,
            },
            ToolInfo {
                id: "a".into(),
                name: "A".into(),
                kind: skillsyoga_config::ToolKind::Builtin,
                config_path: PathBuf::from("/cfg/a"),
                skills_path: PathBuf::from("/skills/a"),
                detected: false,
                enabled: true,
                cli: true,
            },
        ];
        let roots = roots_from_tools(&tools);
        assert_eq!(roots[0], Root::new("b", "/skills/b"));
        assert_eq!(roots[1].id, "a");
    }
}
