//! Repository context for a fix attempt
//!
//! Walks the working copy, scores every eligible source file against the
//! issue text, and keeps a bounded, ranked set of file contents together with
//! a directory summary. The result is rebuilt from scratch for every attempt.

pub mod relevance;
pub mod tree;

use std::fs;
use std::path::Path;

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::PipelineError;
use relevance::{has_source_extension, IssueSignals};

/// Default cap on scored files handed to the model.
pub const DEFAULT_MAX_FILES: usize = 30;

/// Files above this size are skipped, never truncated.
pub const MAX_FILE_BYTES: u64 = 100 * 1024;

/// Package caches and build output: never scored, never descended in the summary.
const DEPENDENCY_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    "target",
    "dist",
    "build",
    "__pycache__",
];

/// Test directories are left out of scoring only.
const TEST_DIRS: &[&str] = &["test", "tests"];

/// Project descriptors read whenever present, outside the scored cap.
pub const MANIFEST_FILES: &[&str] = &[
    "README.md",
    "package.json",
    "go.mod",
    "requirements.txt",
    "Cargo.toml",
    "pom.xml",
    "build.gradle",
];

/// A file discovered during the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Relative to the working copy root, `/`-separated.
    pub path: String,
    pub size_bytes: u64,
    pub is_source: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredFile {
    pub file: CandidateFile,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
}

/// What the model sees of the repository.
///
/// `files` keeps selection order: most relevant first, manifests last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryContext {
    pub structure: String,
    pub files: Vec<ContextFile>,
    pub file_count: usize,
}

impl RepositoryContext {
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.content.as_str())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder {
    max_files: usize,
    max_file_bytes: u64,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_file_bytes: MAX_FILE_BYTES,
        }
    }
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    /// Build the context for one issue from the working copy at `root`.
    pub fn build(
        &self,
        root: &Path,
        issue_title: &str,
        issue_body: &str,
    ) -> Result<RepositoryContext, PipelineError> {
        fs::read_dir(root).map_err(|e| {
            PipelineError::Filesystem(format!(
                "cannot read working copy {}: {}",
                root.display(),
                e
            ))
        })?;

        let signals = IssueSignals::from_issue(issue_title, issue_body);
        debug!(
            mentions = ?signals.mentions,
            keywords = signals.keywords.len(),
            "extracted issue signals"
        );

        let candidates = discover_candidates(root);
        let ranked = rank_files(candidates, &signals, self.max_files, self.max_file_bytes);

        let mut files: Vec<ContextFile> = Vec::with_capacity(ranked.len() + MANIFEST_FILES.len());
        for scored in ranked {
            match fs::read_to_string(root.join(&scored.file.path)) {
                Ok(content) => files.push(ContextFile {
                    path: scored.file.path,
                    content,
                }),
                Err(err) => debug!(path = %scored.file.path, %err, "dropping unreadable file"),
            }
        }

        for manifest in MANIFEST_FILES {
            if files.iter().any(|f| f.path == *manifest) {
                continue;
            }
            if let Ok(content) = fs::read_to_string(root.join(manifest)) {
                files.push(ContextFile {
                    path: manifest.to_string(),
                    content,
                });
            }
        }

        let structure = tree::directory_structure(root);
        let file_count = files.len();

        Ok(RepositoryContext {
            structure,
            files,
            file_count,
        })
    }
}

/// Build a context with the default caps.
pub fn build_context(
    root: &Path,
    issue_title: &str,
    issue_body: &str,
) -> Result<RepositoryContext, PipelineError> {
    ContextBuilder::default().build(root, issue_title, issue_body)
}

fn skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || DEPENDENCY_DIRS.contains(&name.as_ref()) || TEST_DIRS.contains(&name.as_ref())
}

/// Walk the working copy in file-name order and collect every file outside skipped directories.
pub fn discover_candidates(root: &Path) -> Vec<CandidateFile> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !skipped_dir(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let size_bytes = entry.metadata().ok()?.len();
            let relative = entry.path().strip_prefix(root).ok()?;
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let is_source = has_source_extension(&path);
            Some(CandidateFile {
                path,
                size_bytes,
                is_source,
            })
        })
        .collect()
}

/// Score eligible candidates and keep the best `max_files`.
///
/// The sort is stable, so equal scores keep discovery order.
pub fn rank_files(
    candidates: Vec<CandidateFile>,
    signals: &IssueSignals,
    max_files: usize,
    max_file_bytes: u64,
) -> Vec<ScoredFile> {
    let mut scored: Vec<ScoredFile> = candidates
        .into_iter()
        .filter(|file| file.is_source && file.size_bytes <= max_file_bytes)
        .map(|file| {
            let score = signals.score(&file.path);
            ScoredFile { file, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(max_files);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn candidate(path: &str) -> CandidateFile {
        CandidateFile {
            path: path.to_string(),
            size_bytes: 10,
            is_source: has_source_extension(path),
        }
    }

    #[test]
    fn test_build_fails_on_missing_root() {
        let err = build_context(&PathBuf::from("/definitely/not/here"), "t", "b").unwrap_err();
        assert!(matches!(err, PipelineError::Filesystem(_)));
    }

    #[test]
    fn test_mentioned_file_comes_first() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/main.go", "package main");
        write(root, "src/util/parse.go", "package util");
        write(root, "src/util/format.go", "package util");

        let ctx = build_context(root, "Null pointer in src/util/parse.go", "").unwrap();
        let paths: Vec<&str> = ctx.paths().collect();
        assert_eq!(paths[0], "src/util/parse.go");
        assert_eq!(ctx.get("src/util/parse.go"), Some("package util"));
        assert_eq!(ctx.file_count, 3);
    }

    #[test]
    fn test_skips_hidden_dependency_and_test_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "app.js", "x");
        write(root, "node_modules/lib/index.js", "x");
        write(root, ".github/scripts/ci.sh", "x");
        write(root, "tests/app_test.js", "x");
        write(root, "build/out.js", "x");

        let ctx = build_context(root, "", "").unwrap();
        let paths: Vec<&str> = ctx.paths().collect();
        assert_eq!(paths, vec!["app.js"]);
    }

    #[test]
    fn test_oversized_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "small.py", "print(1)");
        write(root, "huge.py", &"#".repeat((MAX_FILE_BYTES + 1) as usize));

        let ctx = build_context(root, "", "").unwrap();
        assert!(ctx.get("small.py").is_some());
        assert!(ctx.get("huge.py").is_none());
    }

    #[test]
    fn test_non_source_files_are_not_scored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "notes.txt", "hello");
        write(root, "lib.rb", "puts 1");

        let ctx = build_context(root, "", "").unwrap();
        let paths: Vec<&str> = ctx.paths().collect();
        assert_eq!(paths, vec!["lib.rb"]);
    }

    #[test]
    fn test_manifests_included_after_scored_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "package.json", "{}");
        write(root, "README.md", "# demo");
        write(root, "tests/README.md", "ignored");
        write(root, "src/index.ts", "export {}");

        let ctx = build_context(root, "", "").unwrap();
        let paths: Vec<&str> = ctx.paths().collect();
        assert_eq!(paths, vec!["src/index.ts", "README.md", "package.json"]);
    }

    #[test]
    fn test_cap_bounds_scored_files_but_not_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for i in 0..45 {
            write(root, &format!("pkg/file{:02}.go", i), "package pkg");
        }
        write(root, "go.mod", "module demo");

        let ctx = build_context(root, "", "").unwrap();
        assert_eq!(ctx.file_count, DEFAULT_MAX_FILES + 1);
        assert!(ctx.get("go.mod").is_some());

        let small = ContextBuilder::new().with_max_files(5).build(root, "", "").unwrap();
        assert_eq!(small.file_count, 6);
    }

    #[test]
    fn test_build_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for name in ["b.go", "a.go", "server/main.go", "z/y/x.go", "README.md"] {
            write(root, name, name);
        }

        let first = build_context(root, "crash in server startup", "stack trace").unwrap();
        let second = build_context(root, "crash in server startup", "stack trace").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rank_keeps_discovery_order_for_ties() {
        let signals = IssueSignals::default();
        let ranked = rank_files(
            vec![
                candidate("c.go"),
                candidate("a.go"),
                candidate("cmd/main.go"),
                candidate("b.go"),
            ],
            &signals,
            10,
            MAX_FILE_BYTES,
        );
        let order: Vec<&str> = ranked.iter().map(|s| s.file.path.as_str()).collect();
        assert_eq!(order, vec!["cmd/main.go", "c.go", "a.go", "b.go"]);
    }

    #[test]
    fn test_rank_never_exceeds_cap() {
        let signals = IssueSignals::from_issue("parser", "");
        for total in [0usize, 1, 29, 30, 31, 200] {
            let candidates = (0..total).map(|i| candidate(&format!("src/parser{}.rs", i))).collect();
            let ranked = rank_files(candidates, &signals, DEFAULT_MAX_FILES, MAX_FILE_BYTES);
            assert!(ranked.len() <= DEFAULT_MAX_FILES);
            assert_eq!(ranked.len(), total.min(DEFAULT_MAX_FILES));
        }
    }

    #[test]
    fn test_discover_uses_forward_slashes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/b/c.rs", "fn c() {}");
        let found = discover_candidates(dir.path());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "a/b/c.rs");
        assert!(found[0].is_source);
        assert_eq!(found[0].size_bytes, 9);
    }
}
