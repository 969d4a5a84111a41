// src/watch/path_utils.rs

//! Path helpers shared by the watcher and source resolution.

use std::path::Path;

/// Render a relative path with forward slashes, the form glob patterns are
/// matched against.
pub fn to_slash(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// Falls back to comparing canonicalized paths when a plain `strip_prefix`
/// fails (symlinked roots, `/private/var` on macOS). Returns `None` if the
/// path is not under `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_slash(rel));
    }

    // Deleted files cannot be canonicalized; try their parent instead.
    let root_canon = root.canonicalize().ok()?;
    let path_canon = match path.canonicalize() {
        Ok(p) => p,
        Err(_) => {
            let parent = path.parent()?.canonicalize().ok()?;
            parent.join(path.file_name()?)
        }
    };

    path_canon
        .strip_prefix(&root_canon)
        .ok()
        .map(to_slash)
}

/// Strip a leading `./` so patterns written either way match the same paths.
pub fn normalize_pattern(pattern: &str) -> &str {
    let mut p = pattern;
    while let Some(rest) = p.strip_prefix("./") {
        p = rest;
    }
    p
}
