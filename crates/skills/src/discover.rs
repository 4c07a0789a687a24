use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use async_trait::async_trait;

use crate::{
    error::{Error, Result},
    parse::{self, MANIFEST_FILE},
    path_guard::PathGuard,
    types::{
        DiscoveryReport, DiscoveryWarning, Root, RootCount, SkillGroup, SkillRecord,
        SkillsRootCandidate,
    },
};

/// Produces the merged skill view for a set of roots.
#[async_trait]
pub trait SkillDiscoverer: Send + Sync {
    async fn discover(&self) -> Result<DiscoveryReport>;
}

/// Filesystem discoverer over an ordered list of roots. Every call re-walks
/// the roots; nothing is cached.
pub struct FsSkillDiscoverer {
    roots: Vec<Root>,
}

impl FsSkillDiscoverer {
    pub fn new(roots: Vec<Root>) -> Self {
        Self { roots }
    }
}

#[async_trait]
impl SkillDiscoverer for FsSkillDiscoverer {
    async fn discover(&self) -> Result<DiscoveryReport> {
        let roots = self.roots.clone();
        tokio::task::spawn_blocking(move || discover(&roots)).await?
    }
}

/// Scan `roots` in order and merge same-named skills into groups.
///
/// Unreadable roots and entries become warnings; only a malformed root list
/// (empty or duplicate ids) is an error.
pub fn discover(roots: &[Root]) -> Result<DiscoveryReport> {
    validate_roots(roots)?;

    let mut records = Vec::new();
    let mut warnings = Vec::new();
    let mut per_root = Vec::with_capacity(roots.len());
    for root in roots {
        let (found, skipped) = scan_root(root);
        per_root.push(RootCount {
            root_id: root.id.clone(),
            skills: found.len(),
        });
        records.extend(found);
        warnings.extend(skipped);
    }

    let groups = merge_records(records);
    tracing::debug!(
        roots = roots.len(),
        groups = groups.len(),
        warnings = warnings.len(),
        "discovered skills"
    );
    Ok(DiscoveryReport {
        groups,
        warnings,
        per_root,
    })
}

fn validate_roots(roots: &[Root]) -> Result<()> {
    let mut seen = HashSet::new();
    for root in roots {
        if root.id.trim().is_empty() {
            return Err(Error::validation(format!(
                "root at {} has an empty id",
                root.path.display()
            )));
        }
        if !seen.insert(root.id.as_str()) {
            return Err(Error::validation(format!("duplicate root id '{}'", root.id)));
        }
    }
    Ok(())
}

/// Immediate subdirectories of `root` that directly contain a manifest, in
/// filesystem enumeration order. Hidden directories are skipped, as are
/// entries that resolve outside the root through a symlink.
pub fn scan_root(root: &Root) -> (Vec<SkillRecord>, Vec<DiscoveryWarning>) {
    let mut records = Vec::new();
    let mut warnings = Vec::new();
    let warn = |path: &Path, message: String| DiscoveryWarning {
        root_id: root.id.clone(),
        path: path.to_path_buf(),
        message,
    };

    if !root.path.exists() {
        tracing::debug!(root = %root.id, path = %root.path.display(), "skills root does not exist");
        return (records, warnings);
    }
    let guard = match PathGuard::new(&root.path) {
        Ok(g) => g,
        Err(e) => {
            tracing::warn!(root = %root.id, path = %root.path.display(), %e, "skipping skills root");
            warnings.push(warn(&root.path, e.to_string()));
            return (records, warnings);
        },
    };
    let entries = match fs::read_dir(guard.root()) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(root = %root.id, path = %root.path.display(), %e, "cannot read skills root");
            warnings.push(warn(&root.path, format!("cannot read directory: {e}")));
            return (records, warnings);
        },
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warnings.push(warn(&root.path, format!("cannot read entry: {e}")));
                continue;
            },
        };
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let skill_dir = entry.path();
        if !skill_dir.is_dir() || !skill_dir.join(MANIFEST_FILE).is_file() {
            continue;
        }
        if !guard.contains(&skill_dir) {
            tracing::warn!(root = %root.id, path = %skill_dir.display(), "skill resolves outside its root");
            warnings.push(warn(&skill_dir, "resolves outside its root".into()));
            continue;
        }
        match read_skill(&skill_dir, &root.id) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(path = %skill_dir.display(), %e, "failed to read SKILL.md");
                warnings.push(warn(&skill_dir, e.to_string()));
            },
        }
    }
    (records, warnings)
}

/// [`read_skill`] on the blocking pool.
pub async fn load_skill(skill_dir: PathBuf, root_id: String) -> Result<SkillRecord> {
    tokio::task::spawn_blocking(move || read_skill(&skill_dir, &root_id)).await?
}

/// Parse the manifest in `skill_dir` into a record owned by `root_id`.
pub fn read_skill(skill_dir: &Path, root_id: &str) -> Result<SkillRecord> {
    let manifest = skill_dir.join(MANIFEST_FILE);
    let content = fs::read_to_string(&manifest)?;
    let meta = parse::parse_manifest_in(&content, skill_dir);
    let modified_at_ms = fs::metadata(&manifest)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    Ok(SkillRecord {
        name: meta.name,
        description: meta.description,
        path: skill_dir.to_path_buf(),
        root_id: root_id.to_string(),
        modified_at_ms,
    })
}

/// Group records by trimmed, lowercased name. Groups come out in order of
/// first encounter; members sort by `(root_id, path)`.
pub fn merge_records(records: Vec<SkillRecord>) -> Vec<SkillGroup> {
    let mut order: Vec<Vec<SkillRecord>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        let key = record.group_key();
        match index.get(&key) {
            Some(&i) => order[i].push(record),
            None => {
                index.insert(key, order.len());
                order.push(vec![record]);
            },
        }
    }

    order
        .into_iter()
        .filter_map(|mut members| {
            members.sort_by(|a, b| (&a.root_id, &a.path).cmp(&(&b.root_id, &b.path)));
            let primary = members.first()?.clone();
            let mut root_ids: Vec<String> = Vec::new();
            for m in &members {
                if !root_ids.contains(&m.root_id) {
                    root_ids.push(m.root_id.clone());
                }
            }
            let descriptions: BTreeSet<&str> =
                members.iter().map(|m| m.description.trim()).collect();
            Some(SkillGroup {
                primary,
                has_description_diff: descriptions.len() > 1,
                root_ids,
                members,
            })
        })
        .collect()
}

const DISCOVER_MAX_DEPTH: usize = 6;
const DISCOVER_SKIPPED: &[&str] = &["node_modules", "target", "dist", "build"];

/// Directories under `dir` that hold skills: either a manifest of their own
/// or child skill directories. Sorted by skill count (desc), then path
/// length, then path.
pub fn discover_skills_roots(dir: &Path) -> Vec<SkillsRootCandidate> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut stack = vec![(dir.to_path_buf(), 0usize)];
    let mut found: BTreeMap<PathBuf, usize> = BTreeMap::new();
    while let Some((current, depth)) = stack.pop() {
        let Ok(entries) = fs::read_dir(&current) else {
            continue;
        };
        let mut child_skills = 0usize;
        for entry in entries.flatten() {
            let child = entry.path();
            let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            // Only real directories; symlinks could loop.
            if name.starts_with('.') || !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            if child.join(MANIFEST_FILE).is_file() {
                child_skills += 1;
            }
            if depth < DISCOVER_MAX_DEPTH && !DISCOVER_SKIPPED.contains(&name.as_str()) {
                stack.push((child, depth + 1));
            }
        }

        let own = current.join(MANIFEST_FILE).is_file();
        if own || child_skills > 0 {
            found.insert(current, child_skills.max(1));
        }
    }

    let mut out: Vec<SkillsRootCandidate> = found
        .into_iter()
        .map(|(path, skill_count)| SkillsRootCandidate { path, skill_count })
        .collect();
    out.sort_by(|a, b| {
        b.skill_count
            .cmp(&a.skill_count)
            .then_with(|| a.path.as_os_str().len().cmp(&b.path.as_os_str().len()))
            .then_with(|| a.path.cmp(&b.path))
    });
    out
}
