//! Path containment: every path the engine reads, writes, moves or deletes is
//! resolved here first and must stay inside a declared root.

use std::{
    fmt,
    fs,
    path::{Component, Path, PathBuf},
};

use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

/// A normalised path relative to some root: `/`-separated, no `.` or `..`
/// segments, no leading separator. The empty path denotes the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelativePath(String);

impl RelativePath {
    /// The root itself.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Normalise `raw`: both `/` and `\` separate segments, empty and `.`
    /// segments collapse, any `..` segment is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.starts_with('/') || raw.starts_with('\\') || Path::new(raw).is_absolute() {
            return Err(Error::invalid_path(format!(
                "'{raw}' must be relative to the skill directory"
            )));
        }

        let mut segments = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => {},
                ".." => {
                    return Err(Error::invalid_path(format!(
                        "'{raw}' must not contain '..'"
                    )));
                },
                s if s.contains(':') && cfg!(windows) => {
                    return Err(Error::invalid_path(format!(
                        "'{raw}' must not contain a drive prefix"
                    )));
                },
                s => segments.push(s),
            }
        }
        Ok(Self(segments.join("/")))
    }

    /// Build from a path already known to be relative and normal (e.g. a
    /// `strip_prefix` result). Non-normal components are rejected.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(seg) => segments.push(seg.to_string_lossy().into_owned()),
                Component::CurDir => {},
                _ => {
                    return Err(Error::invalid_path(format!(
                        "'{}' is not a plain relative path",
                        path.display()
                    )));
                },
            }
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Parent path; the root has none.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Segment-wise prefix test: `a/b` starts with `a` but not with `a/b2`'s `a/b`.
    pub fn starts_with(&self, prefix: &Self) -> bool {
        if prefix.is_root() {
            return true;
        }
        self.0 == prefix.0
            || (self.0.starts_with(&prefix.0) && self.0.as_bytes().get(prefix.0.len()) == Some(&b'/'))
    }

    /// Remainder after `prefix`, if `prefix` is a segment-wise prefix.
    pub fn strip_prefix(&self, prefix: &Self) -> Option<Self> {
        if !self.starts_with(prefix) {
            return None;
        }
        if prefix.is_root() {
            return Some(self.clone());
        }
        Some(Self(
            self.0[prefix.0.len()..].trim_start_matches('/').to_string(),
        ))
    }

    /// Append `other` (which is itself normalised).
    pub fn join(&self, other: &Self) -> Self {
        match (self.is_root(), other.is_root()) {
            (true, _) => other.clone(),
            (_, true) => self.clone(),
            _ => Self(format!("{}/{}", self.0, other.0)),
        }
    }

    /// Host path under `base`.
    pub fn to_path(&self, base: &Path) -> PathBuf {
        let mut out = base.to_path_buf();
        for segment in self.segments() {
            out.push(segment);
        }
        out
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str(".")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl Serialize for RelativePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A path accepted by a [`PathGuard`], in both forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub relative: RelativePath,
    pub absolute: PathBuf,
}

/// Containment check for one root directory.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Guard `root`, which must be an existing directory. Symlinks in `root`
    /// are resolved once here so later prefix checks compare canonical paths.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = fs::canonicalize(root)
            .map_err(|_| Error::not_found(format!("directory {}", root.display())))?;
        if !canonical.is_dir() {
            return Err(Error::validation(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root: canonical })
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative or absolute path. The root itself is accepted
    /// (listing is allowed on it).
    pub fn resolve(&self, raw: &str) -> Result<Resolved> {
        let raw_path = Path::new(raw.trim());
        if raw_path.is_absolute() {
            return self.resolve_absolute(raw_path);
        }
        let relative = RelativePath::parse(raw)?;
        self.resolve_relative(&relative)
    }

    /// Like [`PathGuard::resolve`] but rejects paths that normalise to the
    /// root itself; used for delete, rename and write targets.
    pub fn resolve_for_mutation(&self, raw: &str) -> Result<Resolved> {
        let resolved = self.resolve(raw)?;
        if resolved.relative.is_root() {
            return Err(Error::invalid_path(format!(
                "'{}' refers to the skill directory itself",
                raw.trim()
            )));
        }
        Ok(resolved)
    }

    pub fn resolve_relative(&self, relative: &RelativePath) -> Result<Resolved> {
        let absolute = relative.to_path(&self.root);
        self.ensure_contained(&absolute, relative.as_str())?;
        Ok(Resolved {
            relative: relative.clone(),
            absolute,
        })
    }

    fn resolve_absolute(&self, path: &Path) -> Result<Resolved> {
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(Error::invalid_path(format!(
                "'{}' must not contain '..'",
                path.display()
            )));
        }
        let canonical = canonicalize_lenient(path)?;
        let stripped = canonical.strip_prefix(&self.root).map_err(|_| {
            Error::invalid_path(format!("{} is outside {}", path.display(), self.root.display()))
        })?;
        let relative = RelativePath::from_path(stripped)?;
        Ok(Resolved {
            absolute: relative.to_path(&self.root),
            relative,
        })
    }

    /// The nearest existing ancestor of `absolute`, canonicalised, must stay
    /// under the root. Catches symlinks pointing out of the tree.
    fn ensure_contained(&self, absolute: &Path, shown: &str) -> Result<()> {
        let canonical = canonicalize_lenient(absolute)?;
        if canonical.starts_with(&self.root) {
            Ok(())
        } else {
            Err(Error::invalid_path(format!(
                "'{shown}' resolves outside {}",
                self.root.display()
            )))
        }
    }

    /// Whether an existing or prospective absolute path lies inside the root.
    pub fn contains(&self, path: &Path) -> bool {
        canonicalize_lenient(path).is_ok_and(|p| p.starts_with(&self.root))
    }
}

/// Canonicalise the longest existing prefix of `path` and re-append the
/// missing tail, so prospective targets (e.g. a file about to be written)
/// can be checked too.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();
    loop {
        if fs::symlink_metadata(&existing).is_ok() {
            break;
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            },
            _ => {
                return Err(Error::invalid_path(format!(
                    "{} has no existing ancestor",
                    path.display()
                )));
            },
        }
    }

    let mut canonical = fs::canonicalize(&existing).map_err(|_| {
        Error::invalid_path(format!("{} cannot be resolved", existing.display()))
    })?;
    for name in tail.into_iter().rev() {
        canonical.push(name);
    }
    Ok(canonical)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> (tempfile::TempDir, PathGuard) {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("skill/docs")).unwrap();
        let guard = PathGuard::new(tmp.path().join("skill")).unwrap();
        (tmp, guard)
    }

    #[test]
    fn parse_normalises_separators_and_dots() {
        assert_eq!(RelativePath::parse("a\\b/./c//").unwrap().as_str(), "a/b/c");
        assert_eq!(RelativePath::parse("./").unwrap(), RelativePath::root());
        assert_eq!(RelativePath::parse("").unwrap(), RelativePath::root());
    }

    #[test]
    fn parse_rejects_parent_segments_in_any_position() {
        for raw in ["..", "../x", "a/..", "a/b/../../..", "a\\..\\..\\b", "./.././x", "a/./../b"] {
            let err = RelativePath::parse(raw).unwrap_err();
            assert!(matches!(err, Error::InvalidPath(_)), "{raw}");
        }
    }

    #[test]
    fn parse_rejects_leading_separator() {
        assert!(RelativePath::parse("/etc/passwd").is_err());
        assert!(RelativePath::parse("\\share").is_err());
    }

    #[test]
    fn triple_dot_is_a_plain_name() {
        assert_eq!(RelativePath::parse("a/.../b").unwrap().as_str(), "a/.../b");
    }

    #[test]
    fn prefix_is_segment_wise() {
        let docs = RelativePath::parse("docs").unwrap();
        assert!(RelativePath::parse("docs/a.md").unwrap().starts_with(&docs));
        assert!(RelativePath::parse("docs").unwrap().starts_with(&docs));
        assert!(!RelativePath::parse("docs2/a.md").unwrap().starts_with(&docs));
        assert_eq!(
            RelativePath::parse("docs/x/y")
                .unwrap()
                .strip_prefix(&docs)
                .unwrap()
                .as_str(),
            "x/y"
        );
    }

    #[test]
    fn parent_and_file_name() {
        let p = RelativePath::parse("a/b/c.md").unwrap();
        assert_eq!(p.file_name(), Some("c.md"));
        assert_eq!(p.parent().unwrap().as_str(), "a/b");
        assert_eq!(RelativePath::parse("c.md").unwrap().parent(), Some(RelativePath::root()));
        assert_eq!(RelativePath::root().parent(), None);
    }

    #[test]
    fn resolves_prospective_relative_paths() {
        let (_tmp, guard) = guard();
        let resolved = guard.resolve("docs/new/file.md").unwrap();
        assert_eq!(resolved.relative.as_str(), "docs/new/file.md");
        assert!(resolved.absolute.starts_with(guard.root()));
    }

    #[test]
    fn root_is_listable_but_not_mutable() {
        let (_tmp, guard) = guard();
        assert!(guard.resolve("").unwrap().relative.is_root());
        assert!(guard.resolve("./.").unwrap().relative.is_root());
        assert!(matches!(
            guard.resolve_for_mutation("."),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            guard.resolve_for_mutation(""),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn absolute_inside_root_is_accepted() {
        let (_tmp, guard) = guard();
        let abs = guard.root().join("docs");
        let resolved = guard.resolve(&abs.to_string_lossy()).unwrap();
        assert_eq!(resolved.relative.as_str(), "docs");
    }

    #[test]
    fn absolute_outside_root_is_rejected() {
        let (tmp, guard) = guard();
        let outside = tmp.path().join("elsewhere.md");
        assert!(matches!(
            guard.resolve(&outside.to_string_lossy()),
            Err(Error::InvalidPath(_))
        ));
        let sneaky = format!("{}/../elsewhere.md", guard.root().display());
        assert!(matches!(guard.resolve(&sneaky), Err(Error::InvalidPath(_))));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let (tmp, guard) = guard();
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, guard.root().join("link")).unwrap();

        assert!(matches!(
            guard.resolve("link/secret.txt"),
            Err(Error::InvalidPath(_))
        ));
        assert!(!guard.contains(&guard.root().join("link")));
        assert!(guard.contains(&guard.root().join("docs")));
    }

    #[test]
    fn missing_root_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            PathGuard::new(tmp.path().join("nope")),
            Err(Error::NotFound(_))
        ));
    }
}
