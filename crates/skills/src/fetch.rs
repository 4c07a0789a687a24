//! Remote locators and snapshot fetchers.
//!
//! A locator is validated against the allow-list before any process or
//! network activity. Fetchers produce a plain directory tree; full history
//! is never needed.

use std::{
    path::{Component, Path, PathBuf},
    process::Stdio,
};

use {async_trait::async_trait, serde::Serialize, skillsyoga_config::ImportConfig, url::Url};

use crate::error::{Error, Result};

/// A validated remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteLocator {
    /// Normalised URL without trailing `/` or `.git`.
    pub url: String,
    pub host: String,
    pub owner: String,
    pub repo: String,
}

/// Allow-list of schemes and hosts a locator may use.
#[derive(Debug, Clone)]
pub struct LocatorPolicy {
    allowed_schemes: Vec<String>,
    allowed_hosts: Vec<String>,
}

impl Default for LocatorPolicy {
    fn default() -> Self {
        Self::from_config(&ImportConfig::default())
    }
}

impl LocatorPolicy {
    pub fn from_config(config: &ImportConfig) -> Self {
        Self {
            allowed_schemes: config
                .allowed_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            allowed_hosts: config
                .allowed_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Accepts a full URL, `host/owner/repo`, or `owner/repo` (expanded to
    /// `https://github.com/owner/repo`).
    pub fn validate(&self, raw: &str) -> Result<RemoteLocator> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("repository locator is empty"));
        }
        let expanded = if trimmed.contains("://") {
            trimmed.to_string()
        } else if trimmed.split('/').filter(|s| !s.is_empty()).count() == 2
            && !trimmed.split('/').next().is_some_and(|s| s.contains('.'))
        {
            format!("https://github.com/{trimmed}")
        } else {
            format!("https://{trimmed}")
        };

        let url = Url::parse(&expanded)
            .map_err(|e| Error::validation(format!("invalid repository URL '{trimmed}': {e}")))?;

        let scheme = url.scheme().to_ascii_lowercase();
        if !self.allowed_schemes.contains(&scheme) {
            return Err(Error::validation(format!(
                "scheme '{scheme}' is not allowed (allowed: {})",
                self.allowed_schemes.join(", ")
            )));
        }
        let host = url
            .host_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| Error::validation(format!("'{trimmed}' has no host")))?;
        if !self.allowed_hosts.contains(&host) {
            return Err(Error::validation(format!(
                "host '{host}' is not allowed (allowed: {})",
                self.allowed_hosts.join(", ")
            )));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(Error::validation("repository URLs must not embed credentials"));
        }
        if url.port().is_some() || url.query().is_some() || url.fragment().is_some() {
            return Err(Error::validation(
                "repository URLs must not carry a port, query or fragment",
            ));
        }

        let mut segments: Vec<String> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        if let Some(last) = segments.last_mut()
            && let Some(stripped) = last.strip_suffix(".git")
        {
            *last = stripped.to_string();
        }
        segments.retain(|s| !s.is_empty());
        if segments.len() < 2 || segments.iter().any(|s| s == "." || s == "..") {
            return Err(Error::validation(format!(
                "'{trimmed}' does not name a repository (expected owner/repo)"
            )));
        }

        let owner = segments[0].clone();
        let repo = segments[segments.len() - 1].clone();
        Ok(RemoteLocator {
            url: format!("{scheme}://{host}/{}", segments.join("/")),
            host,
            owner,
            repo,
        })
    }
}

/// Obtains a local snapshot of a remote source.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Populate the empty directory `dest` with the source tree.
    async fn fetch(&self, locator: &RemoteLocator, dest: &Path) -> Result<()>;
}

/// Shallow `git clone`. Dropping the future kills the child process.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    program: PathBuf,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitFetcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl SnapshotFetcher for GitFetcher {
    async fn fetch(&self, locator: &RemoteLocator, dest: &Path) -> Result<()> {
        tracing::info!(url = %locator.url, "cloning repository");
        let output = tokio::process::Command::new(&self.program)
            .args(["clone", "--depth", "1", "--quiet", "--"])
            .arg(&locator.url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Fetch(format!("failed to start {}: {e}", self.program.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Fetch(format!(
                "git clone failed: {}",
                one_line(&stderr)
            )));
        }
        Ok(())
    }
}

/// Downloads the repository tarball over HTTPS. Only GitHub is supported.
#[derive(Debug, Clone, Default)]
pub struct TarballFetcher {
    client: reqwest::Client,
}

impl TarballFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SnapshotFetcher for TarballFetcher {
    async fn fetch(&self, locator: &RemoteLocator, dest: &Path) -> Result<()> {
        if locator.host != "github.com" {
            return Err(Error::validation(format!(
                "tarball downloads are only supported for github.com, not {}",
                locator.host
            )));
        }
        let url = format!(
            "https://api.github.com/repos/{}/{}/tarball",
            locator.owner, locator.repo
        );
        let resp = self
            .client
            .get(&url)
            .header("User-Agent", "skillsyoga")
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("failed to fetch {}: {e}", locator.url)))?;
        if !resp.status().is_success() {
            return Err(Error::Fetch(format!(
                "failed to fetch {}/{}: HTTP {}",
                locator.owner,
                locator.repo,
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("failed to download {}: {e}", locator.url)))?;

        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_tarball(&bytes, &dest)).await??;
        tracing::info!(url = %locator.url, "downloaded repository tarball");
        Ok(())
    }
}

/// Unpack a gzipped tarball whose entries share one top-level directory
/// (GitHub's `<owner>-<repo>-<sha>/`), dropping that directory. Links are
/// skipped; unsafe components abort.
pub(crate) fn unpack_tarball(bytes: &[u8], dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let canonical_dest = std::fs::canonicalize(dest)?;
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            tracing::warn!("skipping link entry in archive");
            continue;
        }
        let path = entry.path()?.into_owned();
        let Some(stripped) = sanitize_archive_path(&path)? else {
            continue;
        };
        let target = canonical_dest.join(&stripped);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
            if !std::fs::canonicalize(parent)?.starts_with(&canonical_dest) {
                return Err(Error::Fetch("archive entry escaped the snapshot directory".into()));
            }
        }
        if kind.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        entry.unpack(&target)?;
    }
    Ok(())
}

fn sanitize_archive_path(path: &Path) -> Result<Option<PathBuf>> {
    let stripped: PathBuf = path.components().skip(1).collect();
    if stripped.as_os_str().is_empty() {
        return Ok(None);
    }
    for component in stripped.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::Fetch(format!(
                    "archive contains unsafe path component: {}",
                    path.display()
                )));
            },
        }
    }
    Ok(Some(stripped))
}

fn one_line(text: &str) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    if joined.is_empty() {
        "no output".to_string()
    } else {
        joined
    }
}
