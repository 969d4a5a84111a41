// src/watch/cache.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::fs::FileSystem;
use crate::watch::hash::{HashStore, compute_aggregate_hash, compute_file_hash};
use crate::watch::path_utils::to_slash;
use crate::watch::patterns::{WatchBinding, collect_matching_files};

/// In-memory cache of file hashes.
///
/// Only files reported as changed are re-read; everything else is served
/// from the cache.
#[derive(Debug, Default)]
pub struct FileCache {
    hashes: HashMap<PathBuf, String>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the hash for a file, computing and caching it if necessary.
    pub fn get_or_compute(&mut self, fs: &dyn FileSystem, path: &Path) -> Result<String> {
        if let Some(hash) = self.hashes.get(path) {
            return Ok(hash.clone());
        }

        debug!("cache miss: computing hash for {:?}", path);
        let hash = compute_file_hash(fs, path)?;
        self.hashes.insert(path.to_path_buf(), hash.clone());
        Ok(hash)
    }

    pub fn invalidate(&mut self, path: &Path) {
        if self.hashes.remove(path).is_some() {
            debug!("invalidated cache for {:?}", path);
        }
    }
}

/// Outcome of checking a `use_hash` binding's watched content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentCheck {
    /// Same aggregate hash as the last built state; do not fire.
    Unchanged,
    /// Content differs. The hash is committed once a Run is started for it.
    Changed(String),
    /// Hashing failed; fire without a hash to commit.
    Unknown,
}

impl ContentCheck {
    pub fn should_fire(&self) -> bool {
        !matches!(self, ContentCheck::Unchanged)
    }

    pub fn into_hash(self) -> Option<String> {
        match self {
            ContentCheck::Changed(hash) => Some(hash),
            _ => None,
        }
    }
}

/// Decides whether a `use_hash` binding's watched content really changed
/// since its last Run started.
///
/// Checking never stores anything: the runtime calls [`ContentGate::commit`]
/// when the core actually starts (or queues) a Run for the trigger, so a
/// trigger dropped in `skip` mode does not hide the edit from later saves.
pub struct ContentGate {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    store: Mutex<Box<dyn HashStore>>,
    cache: Mutex<FileCache>,
}

impl std::fmt::Debug for ContentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentGate")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl ContentGate {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>, store: Box<dyn HashStore>) -> Self {
        Self {
            fs,
            root: root.into(),
            store: Mutex::new(store),
            cache: Mutex::new(FileCache::new()),
        }
    }

    /// Drop stored hashes of bindings that no longer exist.
    pub fn prune(&self, active: &[&str]) {
        let result = lock(&self.store).and_then(|mut store| store.prune(active));
        if let Err(e) = result {
            warn!(error = %e, "failed to prune stale binding hashes");
        }
    }

    /// Record the current content of `binding` when nothing is stored for it
    /// yet, so an unchanged save right after startup does not fire.
    pub fn seed(&self, binding: &WatchBinding) {
        match self.try_seed(binding) {
            Ok(true) => debug!(binding = %binding.name(), "seeded content hash"),
            Ok(false) => {}
            Err(e) => warn!(binding = %binding.name(), error = %e, "failed to seed content hash"),
        }
    }

    fn try_seed(&self, binding: &WatchBinding) -> Result<bool> {
        if lock(&self.store)?.load(binding.name())?.is_some() {
            return Ok(false);
        }
        let hash = self.aggregate(binding, &[])?;
        lock(&self.store)?.save(binding.name(), &hash)?;
        Ok(true)
    }

    /// Check `binding` for `changed` (paths relative to the root). Errors
    /// answer [`ContentCheck::Unknown`]: a spurious Run is better than a
    /// missed one.
    pub fn check(&self, binding: &WatchBinding, changed: &[PathBuf]) -> ContentCheck {
        let result = self.aggregate(binding, changed).and_then(|hash| {
            let stored = lock(&self.store)?.load(binding.name())?;
            Ok((stored.as_deref() == Some(hash.as_str()), hash))
        });
        match result {
            Ok((true, _)) => {
                info!(binding = %binding.name(), "watched content unchanged; skipping trigger");
                ContentCheck::Unchanged
            }
            Ok((false, hash)) => ContentCheck::Changed(hash),
            Err(e) => {
                warn!(binding = %binding.name(), error = %e, "content hash check failed; triggering anyway");
                ContentCheck::Unknown
            }
        }
    }

    /// Store `hash` as the last built content of `binding`.
    pub fn commit(&self, binding: &str, hash: &str) -> Result<()> {
        lock(&self.store)?.save(binding, hash)?;
        debug!(binding = %binding, "committed content hash");
        Ok(())
    }

    fn aggregate(&self, binding: &WatchBinding, changed: &[PathBuf]) -> Result<String> {
        let files = collect_matching_files(self.fs.as_ref(), &self.root, binding)?;

        let mut entries = Vec::with_capacity(files.len());
        {
            let mut cache = lock(&self.cache)?;
            for rel in changed {
                cache.invalidate(&self.root.join(rel));
            }
            for path in files {
                let hash = cache.get_or_compute(self.fs.as_ref(), &path)?;
                let rel = path.strip_prefix(&self.root).unwrap_or(&path);
                entries.push((to_slash(rel), hash));
            }
        }
        entries.sort();
        Ok(compute_aggregate_hash(&entries))
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| anyhow!("content gate mutex poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::TaskExpr;
    use crate::fs::mock::MockFileSystem;
    use crate::watch::hash::MemoryHashStore;

    fn gate(fs: &MockFileSystem) -> ContentGate {
        ContentGate::new(Arc::new(fs.clone()), ".", Box::new(MemoryHashStore::new()))
    }

    fn binding() -> WatchBinding {
        WatchBinding::new("styles", &["src/css/*.css".to_string()], &[], TaskExpr::task("css"))
            .unwrap()
            .with_use_hash(true)
    }

    /// Check and, like the runtime after starting a Run, commit.
    fn fire(gate: &ContentGate, b: &WatchBinding, changed: &[PathBuf]) -> bool {
        match gate.check(b, changed) {
            ContentCheck::Changed(hash) => {
                gate.commit(b.name(), &hash).unwrap();
                true
            }
            other => other.should_fire(),
        }
    }

    #[test]
    fn unchanged_content_does_not_retrigger() {
        let fs = MockFileSystem::new();
        fs.add_file("./src/css/a.css", "body {}");
        let gate = gate(&fs);
        let b = binding();
        let changed = vec![PathBuf::from("src/css/a.css")];

        assert!(fire(&gate, &b, &changed));
        // Saved with identical bytes.
        fs.add_file("./src/css/a.css", "body {}");
        assert!(!fire(&gate, &b, &changed));

        fs.add_file("./src/css/a.css", "body { color: red }");
        assert!(fire(&gate, &b, &changed));
    }

    #[test]
    fn new_file_counts_as_a_change() {
        let fs = MockFileSystem::new();
        fs.add_file("./src/css/a.css", "a");
        let gate = gate(&fs);
        let b = binding();

        assert!(fire(&gate, &b, &[PathBuf::from("src/css/a.css")]));
        fs.add_file("./src/css/b.css", "b");
        assert!(fire(&gate, &b, &[PathBuf::from("src/css/b.css")]));
    }

    #[test]
    fn uncommitted_change_keeps_firing() {
        let fs = MockFileSystem::new();
        fs.add_file("./src/css/a.css", "v1");
        let gate = gate(&fs);
        let b = binding();
        gate.seed(&b);

        let changed = vec![PathBuf::from("src/css/a.css")];
        fs.add_file("./src/css/a.css", "v2");
        let first = gate.check(&b, &changed);
        assert!(matches!(first, ContentCheck::Changed(_)));

        // Not committed (the trigger was dropped), so the same bytes fire again.
        assert_eq!(gate.check(&b, &changed), first);

        gate.commit(b.name(), &first.into_hash().unwrap()).unwrap();
        assert_eq!(gate.check(&b, &changed), ContentCheck::Unchanged);
    }

    #[test]
    fn seeding_suppresses_an_unchanged_first_save() {
        let fs = MockFileSystem::new();
        fs.add_file("./src/css/a.css", "body {}");
        let gate = gate(&fs);
        let b = binding();

        gate.seed(&b);
        fs.add_file("./src/css/a.css", "body {}");
        assert_eq!(
            gate.check(&b, &[PathBuf::from("src/css/a.css")]),
            ContentCheck::Unchanged
        );
    }

    #[test]
    fn seeding_keeps_an_existing_stored_hash() {
        let fs = MockFileSystem::new();
        fs.add_file("./src/css/a.css", "v1");
        let mut store = MemoryHashStore::new();
        store.save("styles", "stale").unwrap();
        let gate = ContentGate::new(Arc::new(fs.clone()), ".", Box::new(store));
        let b = binding();

        // Content edited while no watcher ran: the first save must still fire.
        gate.seed(&b);
        assert!(gate.check(&b, &[]).should_fire());
    }
}
