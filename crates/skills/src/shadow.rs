//! Caller-side state keyed by relative path (open buffers, dirty markers,
//! collapsed folders, the active file) and the pure remapping that keeps it
//! consistent with renames.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::{path_guard::RelativePath, types::FileEntry};

/// A rename of `from` to `to`, applied to every descendant by prefix
/// substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathRemap {
    from: RelativePath,
    to: RelativePath,
}

impl PathRemap {
    pub fn new(from: RelativePath, to: RelativePath) -> Self {
        Self { from, to }
    }

    pub fn from(&self) -> &RelativePath {
        &self.from
    }

    pub fn to(&self) -> &RelativePath {
        &self.to
    }

    /// The new location of `path`, or `None` when the rename does not
    /// touch it.
    pub fn apply(&self, path: &RelativePath) -> Option<RelativePath> {
        path.strip_prefix(&self.from).map(|rest| self.to.join(&rest))
    }
}

pub fn remap_path(path: &RelativePath, remap: &PathRemap) -> RelativePath {
    remap.apply(path).unwrap_or_else(|| path.clone())
}

pub fn remap_keys<V>(map: BTreeMap<RelativePath, V>, remap: &PathRemap) -> BTreeMap<RelativePath, V> {
    map.into_iter()
        .map(|(k, v)| (remap_path(&k, remap), v))
        .collect()
}

pub fn remap_set(set: BTreeSet<RelativePath>, remap: &PathRemap) -> BTreeSet<RelativePath> {
    set.into_iter().map(|p| remap_path(&p, remap)).collect()
}

/// Entries not hidden under a collapsed directory. Collapsed directories
/// themselves stay visible. Expects [`crate::tree::FileTreeStore::list`]
/// order.
pub fn visible_entries<'a>(
    entries: &'a [FileEntry],
    collapsed: &BTreeSet<RelativePath>,
) -> Vec<&'a FileEntry> {
    entries
        .iter()
        .filter(|e| {
            let mut ancestor = e.relative_path.parent();
            while let Some(dir) = ancestor {
                if dir.is_root() {
                    break;
                }
                if collapsed.contains(&dir) {
                    return false;
                }
                ancestor = dir.parent();
            }
            true
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferState {
    Clean,
    Dirty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    saved: String,
    current: String,
}

impl Buffer {
    pub fn saved(&self) -> &str {
        &self.saved
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn state(&self) -> BufferState {
        if self.current == self.saved {
            BufferState::Clean
        } else {
            BufferState::Dirty
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    /// Nothing changed; the caller must save, discard or cancel first.
    Blocked { dirty: Vec<RelativePath> },
}

/// Editor-side bookkeeping for one skill.
#[derive(Debug, Clone, Default)]
pub struct EditorState {
    buffers: BTreeMap<RelativePath, Buffer>,
    collapsed: BTreeSet<RelativePath>,
    active: Option<RelativePath>,
}

impl EditorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `path` with its on-disk content. An already open buffer is
    /// left as is.
    pub fn open(&mut self, path: RelativePath, content: String) {
        self.buffers.entry(path).or_insert_with(|| Buffer {
            current: content.clone(),
            saved: content,
        });
    }

    /// Replace the working content. `None` when `path` is not open.
    pub fn edit(&mut self, path: &RelativePath, content: String) -> Option<BufferState> {
        let buffer = self.buffers.get_mut(path)?;
        buffer.current = content;
        Some(buffer.state())
    }

    /// Record a successful write of `content`.
    pub fn mark_saved(&mut self, path: &RelativePath, content: String) -> Option<BufferState> {
        let buffer = self.buffers.get_mut(path)?;
        buffer.saved = content;
        Some(buffer.state())
    }

    pub fn discard(&mut self, path: &RelativePath) {
        if let Some(buffer) = self.buffers.get_mut(path) {
            buffer.current = buffer.saved.clone();
        }
    }

    pub fn close(&mut self, path: &RelativePath) -> Option<Buffer> {
        if self.active.as_ref() == Some(path) {
            self.active = None;
        }
        self.buffers.remove(path)
    }

    pub fn buffer(&self, path: &RelativePath) -> Option<&Buffer> {
        self.buffers.get(path)
    }

    pub fn state(&self, path: &RelativePath) -> Option<BufferState> {
        self.buffers.get(path).map(Buffer::state)
    }

    pub fn dirty_paths(&self) -> Vec<RelativePath> {
        self.buffers
            .iter()
            .filter(|(_, b)| b.state() == BufferState::Dirty)
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn active(&self) -> Option<&RelativePath> {
        self.active.as_ref()
    }

    /// Make `path` active unless some buffer is dirty.
    pub fn switch_active(&mut self, path: RelativePath) -> SwitchOutcome {
        if self.active.as_ref() == Some(&path) {
            return SwitchOutcome::Switched;
        }
        let dirty = self.dirty_paths();
        if !dirty.is_empty() {
            return SwitchOutcome::Blocked { dirty };
        }
        self.active = Some(path);
        SwitchOutcome::Switched
    }

    /// Toggle collapse of a directory; returns whether it is now collapsed.
    pub fn toggle_collapsed(&mut self, dir: RelativePath) -> bool {
        if self.collapsed.remove(&dir) {
            false
        } else {
            self.collapsed.insert(dir);
            true
        }
    }

    pub fn collapsed(&self) -> &BTreeSet<RelativePath> {
        &self.collapsed
    }

    /// Rewrite every path-keyed structure after a rename.
    pub fn apply_rename(&mut self, remap: &PathRemap) {
        self.buffers = remap_keys(std::mem::take(&mut self.buffers), remap);
        self.collapsed = remap_set(std::mem::take(&mut self.collapsed), remap);
        self.active = self.active.take().map(|p| remap_path(&p, remap));
    }

    /// Drop state for `path` and everything below it after a delete.
    pub fn forget_deleted(&mut self, path: &RelativePath) {
        self.buffers.retain(|p, _| !p.starts_with(path));
        self.collapsed.retain(|p| !p.starts_with(path));
        if self.active.as_ref().is_some_and(|a| a.starts_with(path)) {
            self.active = None;
        }
    }
}
