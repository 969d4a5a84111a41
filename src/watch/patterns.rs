// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::model::ConfigFile;
use crate::dag::TaskExpr;
use crate::fs::FileSystem;
use crate::watch::path_utils::{normalize_pattern, to_slash};

/// A watch binding: path patterns tied to the task expression they trigger.
///
/// Patterns are relative to the project root; the watcher passes relative
/// paths such as `"src/assets/css/site.css"` into [`WatchBinding::matches`].
#[derive(Clone)]
pub struct WatchBinding {
    name: String,
    expr: TaskExpr,
    watch_set: GlobSet,
    exclude_set: Option<GlobSet>,
    reload: bool,
    use_hash: bool,
}

impl fmt::Debug for WatchBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchBinding")
            .field("name", &self.name)
            .field("expr", &self.expr.to_string())
            .finish_non_exhaustive()
    }
}

impl WatchBinding {
    /// Compile a binding. Entries of `patterns` starting with `!` are added
    /// to the exclude set.
    pub fn new(
        name: impl Into<String>,
        patterns: &[String],
        exclude: &[String],
        expr: TaskExpr,
    ) -> Result<Self> {
        let name = name.into();
        let mut watch = Vec::new();
        let mut excluded: Vec<String> = exclude.to_vec();
        for p in patterns {
            match p.strip_prefix('!') {
                Some(neg) => excluded.push(neg.to_string()),
                None => watch.push(p.clone()),
            }
        }

        let watch_set = build_globset(&watch)
            .with_context(|| format!("building watch globset for binding {name}"))?;
        let exclude_set = if excluded.is_empty() {
            None
        } else {
            Some(
                build_globset(&excluded)
                    .with_context(|| format!("building exclude globset for binding {name}"))?,
            )
        };

        Ok(Self {
            name,
            expr,
            watch_set,
            exclude_set,
            reload: true,
            use_hash: false,
        })
    }

    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    pub fn with_use_hash(mut self, use_hash: bool) -> Self {
        self.use_hash = use_hash;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expression run when this binding fires.
    pub fn expr(&self) -> &TaskExpr {
        &self.expr
    }

    /// Whether live-reload clients are notified after each triggered run.
    pub fn reload(&self) -> bool {
        self.reload
    }

    /// Whether this binding only fires when watched contents changed.
    pub fn use_hash(&self) -> bool {
        self.use_hash
    }

    /// Returns true if `rel_path` (relative to the project root) is watched
    /// by this binding and not excluded.
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.watch_set.is_match(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

/// Compile a single glob. `*` does not cross `/`; use `**` for that.
pub fn build_glob(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(normalize_pattern(pattern))
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid glob pattern: {pattern}"))
}

/// Build a GlobSet from simple string patterns.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(build_glob(pat)?);
    }
    Ok(builder.build()?)
}

/// Build every `[watch.<name>]` binding from a validated config.
///
/// A binding without its own `exclude` list inherits `[default].exclude`.
pub fn build_bindings_from_config(cfg: &ConfigFile) -> Result<Vec<WatchBinding>> {
    let default_exclude = &cfg.default_section().exclude;

    cfg.watches()
        .iter()
        .map(|(name, w)| -> Result<WatchBinding> {
            let exclude = w.exclude.as_ref().unwrap_or(default_exclude);
            Ok(WatchBinding::new(name.clone(), &w.patterns, exclude, TaskExpr::from(&w.run))?
                .with_reload(w.reload)
                .with_use_hash(w.use_hash))
        })
        .collect()
}

/// Collect all files under `root` that match a binding's patterns.
///
/// Used when computing aggregated hashes for `use_hash` bindings.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    binding: &WatchBinding,
) -> Result<Vec<PathBuf>> {
    let files = crate::fs::walk_files(fs, root)?;
    Ok(files
        .into_iter()
        .filter(|path| {
            path.strip_prefix(root)
                .map(|rel| binding.matches(&to_slash(rel)))
                .unwrap_or(false)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn binding(patterns: &[&str], exclude: &[&str]) -> WatchBinding {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        WatchBinding::new("styles", &patterns, &exclude, TaskExpr::task("css")).unwrap()
    }

    #[test]
    fn matches_respects_excludes_and_negations() {
        let b = binding(&["src/css/**/*.css", "!src/css/vendor/**"], &["**/*.tmp.css"]);
        assert!(b.matches("src/css/site.css"));
        assert!(b.matches("src/css/deep/x.css"));
        assert!(!b.matches("src/css/vendor/lib.css"));
        assert!(!b.matches("src/css/a.tmp.css"));
        assert!(!b.matches("src/js/app.js"));
    }

    #[test]
    fn leading_dot_slash_is_ignored() {
        let b = binding(&["./src/templates/*.hbs"], &[]);
        assert!(b.matches("src/templates/index.hbs"));
    }

    #[test]
    fn collects_matching_files_for_hashing() {
        let fs = MockFileSystem::new();
        fs.add_file("./src/css/a.css", "a");
        fs.add_file("./src/js/b.js", "b");

        let b = binding(&["src/css/*.css"], &[]);
        let files = collect_matching_files(&fs, Path::new("."), &b).unwrap();
        assert_eq!(files, vec![PathBuf::from("./src/css/a.css")]);
    }
}
