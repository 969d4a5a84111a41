// src/transform/sources.rs

//! Resolving `src` glob patterns into a sorted snapshot of input files.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobMatcher, GlobSet};

use crate::fs::{walk_files, FileSystem};
use crate::watch::path_utils::{normalize_pattern, to_slash};
use crate::watch::patterns::{build_glob, build_globset};

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

/// One input file selected by a [`SourceSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Path as seen through the filesystem (root joined with the match).
    pub path: PathBuf,
    /// Path relative to the glob base of the pattern that matched it; this
    /// is where the output lands beneath `dest`.
    pub relative: PathBuf,
}

struct SourcePattern {
    pattern: String,
    base: PathBuf,
    matcher: GlobMatcher,
}

/// Compiled include/exclude patterns of a transform task.
pub struct SourceSet {
    includes: Vec<SourcePattern>,
    excludes: Option<GlobSet>,
}

impl fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<&str> = self.includes.iter().map(|p| p.pattern.as_str()).collect();
        f.debug_struct("SourceSet")
            .field("includes", &patterns)
            .finish_non_exhaustive()
    }
}

impl SourceSet {
    /// Compile `patterns` (entries starting with `!` exclude) plus an extra
    /// `exclude` list.
    pub fn new(patterns: &[String], exclude: &[String]) -> Result<Self> {
        let mut includes = Vec::new();
        let mut negated: Vec<String> = exclude
            .iter()
            .map(|p| normalize_pattern(p).to_string())
            .collect();

        for raw in patterns {
            if let Some(neg) = raw.strip_prefix('!') {
                negated.push(normalize_pattern(neg).to_string());
                continue;
            }
            let pattern = normalize_pattern(raw).to_string();
            let matcher = build_glob(&pattern)?.compile_matcher();
            includes.push(SourcePattern {
                base: glob_base(&pattern),
                pattern,
                matcher,
            });
        }

        let excludes = if negated.is_empty() {
            None
        } else {
            Some(build_globset(&negated).context("building source exclude set")?)
        };

        Ok(Self { includes, excludes })
    }

    fn is_excluded(&self, rel: &str) -> bool {
        self.excludes.as_ref().is_some_and(|set| set.is_match(rel))
    }

    /// Walk the filesystem under `root` and return every matching file,
    /// sorted by path. The first include pattern that matches a file decides
    /// its glob base.
    pub fn resolve(&self, fs: &dyn FileSystem, root: &Path) -> Result<Vec<ResolvedSource>> {
        let mut found: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();

        for include in self.includes.iter() {
            let base_dir = if include.base.as_os_str().is_empty() {
                root.to_path_buf()
            } else {
                root.join(&include.base)
            };

            let files = walk_files(fs, &base_dir)
                .with_context(|| format!("resolving source pattern {}", include.pattern))?;

            for path in files {
                if found.contains_key(&path) {
                    continue;
                }
                let Ok(rel_root) = path.strip_prefix(root) else {
                    continue;
                };
                let rel = to_slash(rel_root);
                if !include.matcher.is_match(&rel) || self.is_excluded(&rel) {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&base_dir) else {
                    continue;
                };
                let relative = relative.to_path_buf();
                found.insert(path, relative);
            }
        }

        Ok(found
            .into_iter()
            .map(|(path, relative)| ResolvedSource { path, relative })
            .collect())
    }
}

/// The literal directory prefix of a glob pattern.
///
/// `src/assets/sass/**/style.scss` -> `src/assets/sass`;
/// a pattern without metacharacters yields its parent directory.
pub fn glob_base(pattern: &str) -> PathBuf {
    let pattern = normalize_pattern(pattern);
    let segments: Vec<&str> = pattern.split('/').collect();

    let literal = segments
        .iter()
        .take_while(|s| !s.contains(GLOB_META))
        .count();

    // The last segment names files, never the base directory.
    let take = literal.min(segments.len().saturating_sub(1));

    segments[..take]
        .iter()
        .filter(|s| !s.is_empty())
        .collect::<PathBuf>()
}
