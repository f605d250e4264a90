//! Ignore pattern management for uploads
//!
//! Supports multiple sources of ignore patterns:
//! 1. Built-in exclusions (`.git/`, `env.json`, state temp files, the state and trigger
//!    files - always active)
//! 2. `.uploadignore` patterns (tool-specific, any directory depth)
//! 3. `.gitignore` patterns (any directory depth)
//! 4. Config-based patterns (additional custom patterns, root scope)

use crate::state;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Tool-specific ignore file name
pub const UPLOADIGNORE_FILE: &str = ".uploadignore";

/// Git ignore file name
pub const GITIGNORE_FILE: &str = ".gitignore";

/// Local secrets file that never leaves the machine
pub const SECRETS_FILE: &str = "env.json";

/// Directory names that are never uploaded
const BUILTIN_DIRS: &[&str] = &[".git"];

#[derive(Debug, Error)]
pub enum IgnoreError {
    #[error("failed to scan {} for ignore files: {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid ignore file {}: {source}", path.display())]
    Build {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },

    #[error("invalid additional ignore pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: ignore::Error,
    },
}

/// Matchers compiled from the ignore files of one directory
#[derive(Default)]
struct ScopeRules {
    uploadignore: Option<Gitignore>,
    gitignore: Option<Gitignore>,
}

impl ScopeRules {
    /// `.uploadignore` is consulted before `.gitignore`
    fn matched(&self, path: &Path, is_dir: bool) -> Option<bool> {
        for matcher in [&self.uploadignore, &self.gitignore].into_iter().flatten() {
            match matcher.matched_path_or_any_parents(path, is_dir) {
                Match::Ignore(_) => return Some(true),
                Match::Whitelist(_) => return Some(false),
                Match::None => {}
            }
        }
        None
    }

    fn is_empty(&self) -> bool {
        self.uploadignore.is_none() && self.gitignore.is_none()
    }
}

/// Layered ignore rules for one project tree
///
/// Maps each directory that carries an ignore file to its compiled matchers.
/// A path is decided by the deepest enclosing scope that has an opinion on
/// it; scopes without a match defer to their parent. Built-in exclusions
/// come first and cannot be re-included by a negated pattern.
///
/// The set is loaded once and stays immutable for the duration of an upload.
pub struct IgnoreRules {
    /// Project root directory
    root: PathBuf,

    /// Directory scope -> compiled matchers (absolute directory paths)
    scopes: BTreeMap<PathBuf, ScopeRules>,

    /// Config patterns, root scope, lowest priority
    additional: Option<Gitignore>,

    /// Paths excluded regardless of patterns, relative to the root
    excluded_paths: Vec<PathBuf>,

    /// Configuration
    config: IgnoreConfig,
}

impl IgnoreRules {
    /// Load ignore rules for a project
    ///
    /// Walks the tree once, compiling every ignore file found in a directory
    /// that is not itself excluded. `excluded` holds files that must never be
    /// uploaded (state file, trigger file); relative entries are taken as
    /// relative to `root`.
    pub fn load(
        root: &Path,
        config: IgnoreConfig,
        excluded: &[PathBuf],
    ) -> Result<Self, IgnoreError> {
        let mut rules = Self {
            root: root.to_path_buf(),
            scopes: BTreeMap::new(),
            additional: None,
            excluded_paths: Vec::new(),
            config,
        };

        rules.excluded_paths = excluded
            .iter()
            .filter_map(|path| rules.relative(path))
            .map(Path::to_path_buf)
            .collect();
        rules.additional = build_additional(root, &rules.config.additional_patterns)?;
        rules.load_scopes()?;

        debug!(
            "Loaded ignore rules for {} ({} scoped sources)",
            rules.root.display(),
            rules.scopes.len()
        );
        Ok(rules)
    }

    fn load_scopes(&mut self) -> Result<(), IgnoreError> {
        if !self.config.use_gitignore && !self.config.use_uploadignore {
            return Ok(());
        }

        let mut walker = WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|source| IgnoreError::Walk {
                root: self.root.clone(),
                source,
            })?;

            if !entry.file_type().is_dir() {
                continue;
            }

            // Parents are yielded before children, so their scopes are
            // already loaded when a subdirectory is checked.
            if entry.depth() > 0 && self.is_excluded(entry.path(), true) {
                walker.skip_current_dir();
                continue;
            }

            let scope = self.load_scope(entry.path())?;
            if !scope.is_empty() {
                self.scopes.insert(entry.path().to_path_buf(), scope);
            }
        }

        Ok(())
    }

    fn load_scope(&self, dir: &Path) -> Result<ScopeRules, IgnoreError> {
        let mut scope = ScopeRules::default();
        if self.config.use_uploadignore {
            scope.uploadignore = build_ignore_file(dir, UPLOADIGNORE_FILE)?;
        }
        if self.config.use_gitignore {
            scope.gitignore = build_ignore_file(dir, GITIGNORE_FILE)?;
        }
        Ok(scope)
    }

    /// Check if a path is excluded from uploads
    ///
    /// `path` may be absolute (under the root) or relative to the root.
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        let Some(rel) = self.relative(path) else {
            return false;
        };

        // 1. Built-in exclusions (highest priority - always enforced)
        if self.is_builtin_excluded(rel, is_dir) {
            return true;
        }

        // 2. Ignore files, deepest directory first
        let full_path = self.root.join(rel);
        for dir in full_path.ancestors().skip(1) {
            if let Some(scope) = self.scopes.get(dir) {
                if let Some(ignored) = scope.matched(&full_path, is_dir) {
                    return ignored;
                }
            }
            if dir == self.root {
                break;
            }
        }

        // 3. Additional config patterns
        if let Some(ref additional) = self.additional {
            return additional
                .matched_path_or_any_parents(&full_path, is_dir)
                .is_ignore();
        }

        false
    }

    /// Check if path matches built-in exclusions
    ///
    /// These are always enforced regardless of configuration
    fn is_builtin_excluded(&self, rel: &Path, is_dir: bool) -> bool {
        if self.excluded_paths.iter().any(|excluded| excluded == rel) {
            return true;
        }

        if !is_dir {
            if let Some(name) = rel.file_name() {
                if name == SECRETS_FILE || state::is_temp_file_name(name) {
                    return true;
                }
            }
        }

        rel.components().any(|component| match component {
            Component::Normal(name) => BUILTIN_DIRS.iter().any(|dir| name == *dir),
            _ => false,
        })
    }

    /// Path relative to the root; `None` for absolute paths outside it
    fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        if path.is_absolute() {
            path.strip_prefix(&self.root).ok()
        } else {
            Some(path)
        }
    }

    /// Get project root
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn build_ignore_file(dir: &Path, name: &str) -> Result<Option<Gitignore>, IgnoreError> {
    let path = dir.join(name);
    if !path.is_file() {
        return Ok(None);
    }

    let mut builder = GitignoreBuilder::new(dir);
    if let Some(err) = builder.add(&path) {
        // Bad lines are skipped; the rest of the file still applies.
        warn!("Ignoring invalid lines in {}: {}", path.display(), err);
    }
    let matcher = builder
        .build()
        .map_err(|source| IgnoreError::Build { path, source })?;
    Ok(Some(matcher))
}

fn build_additional(root: &Path, patterns: &[String]) -> Result<Option<Gitignore>, IgnoreError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        builder
            .add_line(None, pattern)
            .map_err(|source| IgnoreError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
    }
    let matcher = builder.build().map_err(|source| IgnoreError::Pattern {
        pattern: patterns.join(", "),
        source,
    })?;
    Ok(Some(matcher))
}

/// Ignore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Use .gitignore patterns (default: true)
    #[serde(default = "default_true")]
    pub use_gitignore: bool,

    /// Use .uploadignore patterns (default: true)
    #[serde(default = "default_true")]
    pub use_uploadignore: bool,

    /// Additional patterns from config
    #[serde(default)]
    pub additional_patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            use_gitignore: true,
            use_uploadignore: true,
            additional_patterns: vec![],
        }
    }
}

fn default_true() -> bool {
    true
}
