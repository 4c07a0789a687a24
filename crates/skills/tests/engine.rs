//! End-to-end behaviour of the skills engine through the command facade.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {async_trait::async_trait, tokio_util::sync::CancellationToken};

use skillsyoga_skills::{
    ConflictPolicy, Error, ImportPipeline, Root, SkillSelector, SkillService,
    fetch::{LocatorPolicy, RemoteLocator, SnapshotFetcher},
    locks::DirLocks,
    parse::parse_manifest,
    trash::{FallbackTrash, RecoverableStore},
};

/// Serves a local directory tree as the snapshot of any locator.
struct FixtureFetcher {
    source: PathBuf,
}

#[async_trait]
impl SnapshotFetcher for FixtureFetcher {
    async fn fetch(&self, _locator: &RemoteLocator, dest: &Path) -> skillsyoga_skills::Result<()> {
        copy_dir(&self.source, dest);
        Ok(())
    }
}

fn copy_dir(src: &Path, dst: &Path) {
    std::fs::create_dir_all(dst).unwrap();
    for entry in std::fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let target = dst.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), target).unwrap();
        }
    }
}

struct Env {
    tmp: tempfile::TempDir,
    locks: DirLocks,
    service: SkillService,
}

impl Env {
    fn root(&self, id: &str) -> PathBuf {
        self.tmp.path().join("roots").join(id)
    }

    fn trash_dir(&self) -> PathBuf {
        self.tmp.path().join("trash")
    }
}

fn env_with_snapshot(snapshot: Option<&Path>) -> Env {
    let tmp = tempfile::tempdir().unwrap();
    let roots = vec![
        Root::new("alpha", tmp.path().join("roots/alpha")),
        Root::new("beta", tmp.path().join("roots/beta")),
    ];
    for root in &roots {
        std::fs::create_dir_all(&root.path).unwrap();
    }
    let source = snapshot
        .map(Path::to_path_buf)
        .unwrap_or_else(|| tmp.path().join("empty-snapshot"));
    std::fs::create_dir_all(&source).unwrap();

    let locks = DirLocks::new();
    let trash: Arc<dyn RecoverableStore> = Arc::new(FallbackTrash::new(tmp.path().join("trash")));
    let import = ImportPipeline::new(
        LocatorPolicy::default(),
        Arc::new(FixtureFetcher { source }),
        locks.clone(),
        Arc::clone(&trash),
    );
    Env {
        service: SkillService::new(roots, locks.clone(), trash, import),
        locks,
        tmp,
    }
}

fn env() -> Env {
    env_with_snapshot(None)
}

fn write_skill(dir: &Path, manifest: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("SKILL.md"), manifest).unwrap();
}

fn skill_path(env: &Env, root: &str, name: &str) -> PathBuf {
    std::fs::canonicalize(env.root(root).join(name)).unwrap()
}

#[tokio::test]
async fn traversal_is_rejected_at_any_depth() {
    let env = env();
    write_skill(&env.root("alpha").join("demo"), "# Demo\n");
    let skill = skill_path(&env, "alpha", "demo");

    for raw in [
        "..",
        "../beta",
        "a/../../x",
        "a/b/c/../../../../x",
        "./../x",
        "a\\..\\..\\x",
        "a/./b/../../..",
    ] {
        let err = env.service.read_entry(&skill, raw).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)), "{raw}: {err}");
        let err = env.service.write_entry(&skill, raw, "x").await.unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)), "{raw}: {err}");
    }
    assert!(!env.root("alpha").join("x").exists());
}

#[tokio::test]
async fn directory_rename_rewrites_only_its_prefix() {
    let env = env();
    write_skill(&env.root("alpha").join("demo"), "# Demo\n");
    let skill = skill_path(&env, "alpha", "demo");
    for (path, body) in [
        ("D/one.md", "1"),
        ("D/nested/two.md", "2"),
        ("Dx/three.md", "3"),
        ("top.md", "t"),
    ] {
        env.service.write_entry(&skill, path, body).await.unwrap();
    }
    let before: Vec<String> = env
        .service
        .list_entries(&skill)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.relative_path.as_str().to_string())
        .collect();

    let remap = env.service.rename_entry(&skill, "D", "D2").await.unwrap();

    let mut expected: Vec<String> = before
        .iter()
        .map(|p| {
            let rel = skillsyoga_skills::RelativePath::parse(p).unwrap();
            remap.apply(&rel).unwrap_or(rel).as_str().to_string()
        })
        .collect();
    expected.sort();
    let mut after: Vec<String> = env
        .service
        .list_entries(&skill)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.relative_path.as_str().to_string())
        .collect();
    after.sort();
    assert_eq!(after, expected);
    assert!(after.contains(&"Dx/three.md".to_string()));
    assert_eq!(
        env.service.read_entry(&skill, "D2/nested/two.md").await.unwrap(),
        "2"
    );
}

#[tokio::test]
async fn non_empty_directory_needs_children_removed_first() {
    let env = env();
    write_skill(&env.root("alpha").join("demo"), "# Demo\n");
    let skill = skill_path(&env, "alpha", "demo");
    env.service.write_entry(&skill, "assets/a.txt", "a").await.unwrap();
    env.service.write_entry(&skill, "assets/b.txt", "b").await.unwrap();

    let err = env
        .service
        .delete_empty_directory(&skill, "assets")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotEmpty(_)));

    env.service.delete_entry(&skill, "assets/a.txt").await.unwrap();
    env.service.delete_entry(&skill, "assets/b.txt").await.unwrap();
    env.service.delete_empty_directory(&skill, "assets").await.unwrap();
    assert!(!skill.join("assets").exists());

    // Everything removed is still recoverable.
    let held = std::fs::read_dir(env.trash_dir()).unwrap().count();
    assert_eq!(held, 3);
}

#[tokio::test]
async fn same_name_across_roots_merges_into_one_group() {
    let env = env();
    write_skill(
        &env.root("beta").join("pdf"),
        "---\nname: PDF\ndescription: from beta\n---\n",
    );
    write_skill(
        &env.root("alpha").join("pdf-tools"),
        "---\nname: \"  pdf \"\ndescription: from alpha\n---\n",
    );

    let report = env.service.list_skills().await.unwrap();
    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert!(group.has_description_diff);
    assert_eq!(group.primary.root_id, "alpha");
    assert_eq!(group.root_ids, vec!["alpha", "beta"]);
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn write_then_read_is_identical() {
    let env = env();
    write_skill(&env.root("alpha").join("demo"), "# Demo\n");
    let skill = skill_path(&env, "alpha", "demo");
    let text = "line 1\r\nline 2\n\ttabbed ünïcödé\n";
    env.service.write_entry(&skill, "notes/n.md", text).await.unwrap();
    assert_eq!(env.service.read_entry(&skill, "notes/n.md").await.unwrap(), text);
}

#[test]
fn manifest_scenarios() {
    let meta = parse_manifest("---\nname: Foo\ndescription: Bar\n---\n# Ignored", "dir");
    assert_eq!((meta.name.as_str(), meta.description.as_str()), ("Foo", "Bar"));
    let meta = parse_manifest("# Just A Heading\nBody", "dir");
    assert_eq!(
        (meta.name.as_str(), meta.description.as_str()),
        ("Just A Heading", "")
    );
}

#[tokio::test]
async fn import_with_missing_sub_path_leaves_target_unchanged() {
    let snapshot = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(snapshot.path().join("skills/a")).unwrap();
    std::fs::write(snapshot.path().join("skills/a/README.md"), "no manifest").unwrap();
    let env = env_with_snapshot(Some(snapshot.path()));
    write_skill(&env.root("alpha").join("existing"), "# Existing\n");

    let err = env
        .service
        .import_skill(
            "https://github.com/acme/skills",
            SkillSelector::SubPath("skills/a".into()),
            "alpha",
            ConflictPolicy::Overwrite,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let names: Vec<_> = std::fs::read_dir(env.root("alpha"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec!["existing"]);
}

#[tokio::test]
async fn import_locates_and_installs_skill() {
    let snapshot = tempfile::tempdir().unwrap();
    write_skill(
        &snapshot.path().join("skills/git-helper"),
        "---\nname: Git Helper\ndescription: commits\n---\n",
    );
    std::fs::write(snapshot.path().join("skills/git-helper/usage.md"), "use").unwrap();
    let env = env_with_snapshot(Some(snapshot.path()));

    let record = env
        .service
        .import_skill(
            "acme/skills",
            SkillSelector::Auto,
            "beta",
            ConflictPolicy::TimestampedCopy,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(record.name, "Git Helper");
    assert_eq!(record.root_id, "beta");
    assert!(record.path.join("usage.md").is_file());

    // A second import keeps the first copy and lands next to it.
    let again = env
        .service
        .import_skill(
            "acme/skills",
            SkillSelector::Auto,
            "beta",
            ConflictPolicy::TimestampedCopy,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_ne!(again.path, record.path);
    assert!(record.path.join("usage.md").is_file());
}

#[tokio::test]
async fn disallowed_host_is_rejected_before_fetch() {
    let env = env();
    let err = env
        .service
        .import_skill(
            "https://example.com/acme/skills",
            SkillSelector::Auto,
            "alpha",
            ConflictPolicy::Overwrite,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn timestamped_copy_leaves_existing_destination_intact() {
    let env = env();
    write_skill(&env.root("alpha").join("shared"), "# Shared v2\n");
    write_skill(&env.root("beta").join("shared"), "# Shared v1\n");
    std::fs::write(env.root("beta").join("shared/local.md"), "mine").unwrap();

    let copied = env
        .service
        .copy_skill(
            &skill_path(&env, "alpha", "shared"),
            "beta",
            ConflictPolicy::TimestampedCopy,
        )
        .await
        .unwrap();

    let original = skill_path(&env, "beta", "shared");
    assert_ne!(copied.path, original);
    assert_eq!(
        std::fs::read_to_string(original.join("local.md")).unwrap(),
        "mine"
    );
    assert_eq!(
        std::fs::read_to_string(original.join("SKILL.md")).unwrap(),
        "# Shared v1\n"
    );
    assert_eq!(copied.name, "Shared v2");
}

#[tokio::test]
async fn mutations_wait_for_the_skill_lock() {
    let env = env();
    write_skill(&env.root("alpha").join("demo"), "# Demo\n");
    let skill = skill_path(&env, "alpha", "demo");

    let held = env.locks.lock(&skill).await;
    let target = skill.join("notes.md");
    let observer = async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let written_early = target.exists();
        drop(held);
        written_early
    };
    let (written, written_early) =
        tokio::join!(env.service.write_entry(&skill, "notes.md", "x"), observer);
    written.unwrap();
    assert!(!written_early, "write ran while the skill was locked");
    assert!(skill.join("notes.md").is_file());
}

#[tokio::test]
async fn racing_rename_and_write_never_interleave() {
    let env = env();
    write_skill(&env.root("alpha").join("demo"), "# Demo\n");
    let skill = skill_path(&env, "alpha", "demo");
    for i in 0..20 {
        env.service
            .write_entry(&skill, &format!("D/f{i}.md"), "x")
            .await
            .unwrap();
    }

    let (renamed, written) = tokio::join!(
        env.service.rename_entry(&skill, "D", "E"),
        env.service.write_entry(&skill, "D/new.md", "n"),
    );
    renamed.unwrap();
    written.unwrap();

    for i in 0..20 {
        assert!(skill.join(format!("E/f{i}.md")).is_file());
    }
    // Either the write landed before the rename and moved with it, or it
    // ran after and recreated `D` on its own.
    let moved = skill.join("E/new.md").is_file();
    let recreated = skill.join("D/new.md").is_file();
    assert!(moved ^ recreated);
    if moved {
        assert!(!skill.join("D").exists());
    }
}

#[tokio::test]
async fn copy_waits_for_writes_to_the_source() {
    let env = env();
    write_skill(&env.root("alpha").join("shared"), "# Shared\n");
    let source = skill_path(&env, "alpha", "shared");

    let held = env.locks.lock(&source).await;
    let landing = env.root("beta").join("shared");
    let observer = async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let copied_early = landing.exists();
        drop(held);
        copied_early
    };
    let (copied, copied_early) = tokio::join!(
        env.service
            .copy_skill(&source, "beta", ConflictPolicy::TimestampedCopy),
        observer
    );
    copied.unwrap();
    assert!(!copied_early, "copy read the source while it was locked");
}

#[tokio::test]
async fn deleted_skill_is_recoverable_in_full() {
    let env = env();
    let dir = env.root("alpha").join("keeper");
    write_skill(&dir, "# Keeper\n");
    std::fs::create_dir_all(dir.join(".git/refs")).unwrap();
    std::fs::write(dir.join(".git/HEAD"), "ref: main").unwrap();
    std::fs::create_dir_all(dir.join("assets/img")).unwrap();
    std::fs::write(dir.join("assets/img/logo.svg"), "<svg/>").unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink("SKILL.md", dir.join("link.md")).unwrap();
    let skill = skill_path(&env, "alpha", "keeper");

    let handle = env.service.delete_skill(&skill).await.unwrap();
    let held = handle.location.unwrap();

    assert!(!skill.exists());
    assert_eq!(std::fs::read_to_string(held.join("SKILL.md")).unwrap(), "# Keeper\n");
    assert_eq!(std::fs::read_to_string(held.join(".git/HEAD")).unwrap(), "ref: main");
    assert!(held.join(".git/refs").is_dir());
    assert!(held.join("assets/img/logo.svg").is_file());
    #[cfg(unix)]
    assert_eq!(
        std::fs::read_link(held.join("link.md")).unwrap(),
        Path::new("SKILL.md")
    );
}
