// src/watch/hash.rs

//! Content hashes for `use_hash` watch bindings.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::{debug, info};

use crate::fs::FileSystem;
use crate::types::HashStorageMode;

/// Relative path (from the project root) to the hashes file.
pub const HASH_FILE_PATH: &str = ".assetpipe/hashes";

/// Compute the hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Combine per-file hashes into one.
///
/// Entries are `(relative path, file hash)` and must be sorted by path;
/// including the path makes renames and deletions change the result.
pub fn compute_aggregate_hash(entries: &[(String, String)]) -> String {
    let mut hasher = Hasher::new();
    for (path, hash) in entries {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// Abstract storage for per-binding hashes.
pub trait HashStore: Send + Sync {
    fn load(&self, binding: &str) -> Result<Option<String>>;
    fn save(&mut self, binding: &str, hash: &str) -> Result<()>;
    /// Remove hashes for bindings not in `active`.
    fn prune(&mut self, active: &[&str]) -> Result<()>;
}

/// Build the store selected by `[config].hash_storage_mode`.
pub fn hash_store_for(
    mode: HashStorageMode,
    root: &Path,
    fs: Arc<dyn FileSystem>,
) -> Box<dyn HashStore> {
    match mode {
        HashStorageMode::File => Box::new(FileHashStore::new(root.to_path_buf(), fs)),
        HashStorageMode::Memory => Box::new(MemoryHashStore::new()),
    }
}

/// Stores hashes in `<root>/.assetpipe/hashes`, one `name hash` per line.
pub struct FileHashStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileHashStore {
    pub fn new(root: PathBuf, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: root.join(HASH_FILE_PATH),
            fs,
        }
    }

    fn load_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.fs.exists(&self.path) {
            return Ok(BTreeMap::new());
        }
        let text = self
            .fs
            .read_to_string(&self.path)
            .with_context(|| format!("reading hash file at {:?}", self.path))?;

        Ok(text
            .lines()
            .filter_map(|line| {
                let (name, hash) = line.trim().split_once(char::is_whitespace)?;
                Some((name.to_string(), hash.trim().to_string()))
            })
            .collect())
    }

    fn save_all(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let mut out = String::new();
        for (name, hash) in map {
            out.push_str(name);
            out.push(' ');
            out.push_str(hash);
            out.push('\n');
        }
        self.fs
            .write(&self.path, out.as_bytes())
            .with_context(|| format!("writing hash file at {:?}", self.path))
    }
}

impl HashStore for FileHashStore {
    fn load(&self, binding: &str) -> Result<Option<String>> {
        Ok(self.load_all()?.get(binding).cloned())
    }

    fn save(&mut self, binding: &str, hash: &str) -> Result<()> {
        let mut map = self.load_all()?;
        map.insert(binding.to_string(), hash.to_string());
        self.save_all(&map)?;
        debug!(binding = %binding, hash = %hash, "stored binding hash (file)");
        Ok(())
    }

    fn prune(&mut self, active: &[&str]) -> Result<()> {
        let mut map = self.load_all()?;
        let initial_len = map.len();
        map.retain(|k, _| active.contains(&k.as_str()));

        if map.len() < initial_len {
            self.save_all(&map)?;
            info!(removed = initial_len - map.len(), "pruned stale binding hashes (file)");
        }
        Ok(())
    }
}

/// Stores hashes in memory only.
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    map: BTreeMap<String, String>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashStore for MemoryHashStore {
    fn load(&self, binding: &str) -> Result<Option<String>> {
        Ok(self.map.get(binding).cloned())
    }

    fn save(&mut self, binding: &str, hash: &str) -> Result<()> {
        self.map.insert(binding.to_string(), hash.to_string());
        debug!(binding = %binding, hash = %hash, "stored binding hash (memory)");
        Ok(())
    }

    fn prune(&mut self, active: &[&str]) -> Result<()> {
        self.map.retain(|k, _| active.contains(&k.as_str()));
        Ok(())
    }
}
