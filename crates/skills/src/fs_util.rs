use std::{
    fs, io,
    path::{Path, PathBuf},
};

use {chrono::Utc, tokio_util::sync::CancellationToken, walkdir::WalkDir};

use crate::error::{Error, Result};

/// Directory names never carried along when copying a tree.
const SKIPPED_DIRS: &[&str] = &[".git"];

/// Recursively copy `src` into `dst` (created if missing). Symlinks are not
/// followed or recreated; VCS metadata is skipped. `cancel` is checked
/// before every entry.
pub(crate) fn copy_tree(src: &Path, dst: &Path, cancel: &CancellationToken) -> Result<()> {
    fs::create_dir_all(dst)?;
    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.file_name()
                    .to_str()
                    .is_some_and(|n| SKIPPED_DIRS.contains(&n)))
        });

    for entry in walker {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping non-regular entry during copy");
        }
    }
    Ok(())
}

/// Move `src` to `dst`, falling back to copy + remove when a plain rename
/// cannot cross filesystems.
pub(crate) fn move_path(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => move_by_copy(src, dst),
        Err(e) => Err(e.into()),
    }
}

/// Copy `src` to `dst` entry for entry, then remove `src`. The source is
/// only removed once the copy holds as many entries as the source did; any
/// failure leaves the source untouched and discards the partial copy.
fn move_by_copy(src: &Path, dst: &Path) -> Result<()> {
    if fs::symlink_metadata(dst).is_ok() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", dst.display()),
        )));
    }
    let expected = count_entries(src)?;
    let copied = match mirror_tree(src, dst) {
        Ok(n) => n,
        Err(e) => {
            remove_any(dst).ok();
            return Err(e);
        },
    };
    if copied != expected {
        remove_any(dst).ok();
        return Err(Error::Io(io::Error::other(format!(
            "copied {copied} of {expected} entries from {}",
            src.display()
        ))));
    }
    remove_any(src)?;
    tracing::debug!(from = %src.display(), to = %dst.display(), entries = copied, "moved across filesystems");
    Ok(())
}

fn count_entries(path: &Path) -> Result<usize> {
    let mut n = 0;
    for entry in WalkDir::new(path).follow_links(false) {
        entry?;
        n += 1;
    }
    Ok(n)
}

/// Faithful copy: directories, regular files and symlinks (recreated, not
/// followed), `.git` included. Other entry kinds are an error. Returns the
/// number of entries written, `src` itself included.
fn mirror_tree(src: &Path, dst: &Path) -> Result<usize> {
    let mut n = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = if relative.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(relative)
        };
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if file_type.is_dir() {
            fs::create_dir(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        } else {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot copy special file {}", entry.path().display()),
            )));
        }
        n += 1;
    }
    Ok(n)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(windows)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let link = fs::read_link(src)?;
    if fs::metadata(src).is_ok_and(|m| m.is_dir()) {
        std::os::windows::fs::symlink_dir(link, dst)
    } else {
        std::os::windows::fs::symlink_file(link, dst)
    }
}

#[cfg(not(any(unix, windows)))]
fn copy_symlink(src: &Path, _dst: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot recreate symlink {}", src.display()),
    ))
}

fn remove_any(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// `base/preferred`, or `base/preferred-1`, `-2`, … when taken.
pub(crate) fn unique_path(base: &Path, preferred: &str) -> PathBuf {
    let candidate = base.join(preferred);
    if fs::symlink_metadata(&candidate).is_err() {
        return candidate;
    }
    (1u32..)
        .map(|n| base.join(format!("{preferred}-{n}")))
        .find(|p| fs::symlink_metadata(p).is_err())
        .unwrap_or(candidate)
}

/// Compact UTC timestamp used in trash entries and timestamped copies.
pub(crate) fn timestamp() -> String {
    Utc::now().format("%Y%m%d-%H%M%S").to_string()
}
