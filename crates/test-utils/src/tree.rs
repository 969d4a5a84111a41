//! Helpers for building and snapshotting real directory trees.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Write `(relative path, contents)` pairs beneath `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write fixture file");
    }
}

/// Every file beneath `dir`, keyed by slash-separated relative path.
/// A missing directory yields an empty map.
pub fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    collect(dir, dir, &mut out);
    out
}

fn collect(base: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries {
        let path = entry.expect("dir entry").path();
        if path.is_dir() {
            collect(base, &path, out);
        } else {
            let rel = path
                .strip_prefix(base)
                .expect("path under base")
                .to_string_lossy()
                .replace('\\', "/");
            out.insert(rel, fs::read(&path).expect("read file"));
        }
    }
}

/// Recursively copy every file under `from` into `to`.
pub fn copy_tree(from: &Path, to: &Path) {
    for (rel, contents) in snapshot(from) {
        let path = to.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("copy file");
    }
}
