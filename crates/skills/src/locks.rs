use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    dashmap::DashMap,
    tokio::sync::{Mutex, OwnedMutexGuard},
};

type LockMap = DashMap<PathBuf, Arc<Mutex<()>>>;

/// One async mutex per skill directory. Mutations of the same directory are
/// serialized; different directories proceed in parallel.
#[derive(Debug, Clone, Default)]
pub struct DirLocks {
    inner: Arc<LockMap>,
}

/// Held lock on one directory. Dropping the last holder or waiter removes
/// the directory's entry from the map.
#[derive(Debug)]
pub struct DirGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: PathBuf,
    map: Arc<LockMap>,
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.map
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl DirLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `dir`. The key is canonicalised when the directory exists so two
    /// spellings of one directory share a lock.
    pub async fn lock(&self, dir: &Path) -> DirGuard {
        self.lock_key(key_for(dir)).await
    }

    /// Lock two directories in path order so opposite-direction callers
    /// cannot deadlock. The same directory given twice is locked once.
    pub async fn lock_pair(&self, a: &Path, b: &Path) -> (DirGuard, Option<DirGuard>) {
        let (first, second) = {
            let (a, b) = (key_for(a), key_for(b));
            if a <= b { (a, b) } else { (b, a) }
        };
        if first == second {
            return (self.lock_key(first).await, None);
        }
        let first = self.lock_key(first).await;
        let second = self.lock_key(second).await;
        (first, Some(second))
    }

    async fn lock_key(&self, key: PathBuf) -> DirGuard {
        let mutex = self
            .inner
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        DirGuard {
            guard: Some(mutex.lock_owned().await),
            key,
            map: Arc::clone(&self.inner),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.len()
    }
}

fn key_for(dir: &Path) -> PathBuf {
    std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}
