//! Summary of an existing codebase, used when a request targets tests.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

const SOURCE_EXTENSIONS: &[&str] = &["py", "js", "ts", "java", "go", "rs"];
const IGNORED_DIRS: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    "venv",
    ".venv",
    "__pycache__",
    ".pytest_cache",
];
const TEST_DIRS: &[&str] = &["tests", "test", "__tests__"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodebaseSummary {
    pub file_count: usize,
    /// Relative paths of source files with no matching test.
    pub files_needing_tests: Vec<String>,
    /// e.g. `pytest`, `cargo test`, `jest`.
    pub existing_test_pattern: Option<String>,
}

impl CodebaseSummary {
    /// Prompt-ready text listing at most `max_files` untested files.
    pub fn render(&self, max_files: usize) -> String {
        let mut out = format!("Existing codebase: {} source files.\n", self.file_count);
        if let Some(pattern) = &self.existing_test_pattern {
            out.push_str(&format!("Existing tests use: {pattern}\n"));
        }
        if !self.files_needing_tests.is_empty() {
            out.push_str(&format!(
                "Files without tests ({}):\n",
                self.files_needing_tests.len()
            ));
            for file in self.files_needing_tests.iter().take(max_files) {
                out.push_str(&format!("- {file}\n"));
            }
            if self.files_needing_tests.len() > max_files {
                out.push_str(&format!(
                    "- ... and {} more\n",
                    self.files_needing_tests.len() - max_files
                ));
            }
        }
        out
    }
}

/// `None` means there is no prior codebase.
#[async_trait]
pub trait CodebaseInspector: Send + Sync {
    async fn summarize(&self) -> Option<CodebaseSummary>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoCodebase;

#[async_trait]
impl CodebaseInspector for NoCodebase {
    async fn summarize(&self) -> Option<CodebaseSummary> {
        None
    }
}

/// Walks a directory tree on disk.
#[derive(Debug, Clone)]
pub struct FsCodebaseInspector {
    root: PathBuf,
}

impl FsCodebaseInspector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl CodebaseInspector for FsCodebaseInspector {
    async fn summarize(&self) -> Option<CodebaseSummary> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan(&root))
            .await
            .ok()
            .flatten()
    }
}

struct SourceFile {
    relative: String,
    stem: String,
    extension: String,
    in_test_dir: bool,
    path: PathBuf,
}

impl SourceFile {
    fn is_test(&self) -> bool {
        self.in_test_dir
            || self.stem.starts_with("test_")
            || self.stem.ends_with("_test")
            || self.stem.ends_with(".test")
            || self.stem.ends_with(".spec")
    }

    /// Stem with test affixes removed: `test_parser` and `parser.spec` give `parser`.
    fn subject(&self) -> &str {
        let s = self.stem.as_str();
        s.strip_prefix("test_")
            .or_else(|| s.strip_suffix("_test"))
            .or_else(|| s.strip_suffix(".test"))
            .or_else(|| s.strip_suffix(".spec"))
            .unwrap_or(s)
    }
}

fn scan(root: &Path) -> Option<CodebaseSummary> {
    if !root.is_dir() {
        return None;
    }
    let files = walk(root);
    if files.is_empty() {
        return None;
    }

    let tested: BTreeSet<&str> = files
        .iter()
        .filter(|f| f.is_test())
        .map(|f| f.subject())
        .collect();
    let mut files_needing_tests: Vec<String> = files
        .iter()
        .filter(|f| !f.is_test())
        .filter(|f| !tested.contains(f.stem.as_str()))
        .filter(|f| !(f.extension == "rs" && has_inline_tests(&f.path)))
        .map(|f| f.relative.clone())
        .collect();
    files_needing_tests.sort();

    let summary = CodebaseSummary {
        file_count: files.len(),
        files_needing_tests,
        existing_test_pattern: detect_test_pattern(root, &files),
    };
    debug!(root = %root.display(), files = summary.file_count, "codebase scanned");
    Some(summary)
}

/// Symlinks are not followed; `.gitignore` rules apply inside git work trees.
fn walk(root: &Path) -> Vec<SourceFile> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .follow_links(false)
        .git_ignore(true)
        .git_exclude(true)
        .git_global(false)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            let name = entry.file_name().to_string_lossy();
            !(is_dir && (IGNORED_DIRS.contains(&&*name) || name.ends_with(".egg-info")))
        });

    let mut out = Vec::new();
    for entry in builder.build() {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !SOURCE_EXTENSIONS.contains(&extension) {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let in_test_dir = rel
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .any(|c| TEST_DIRS.contains(&&*c.as_os_str().to_string_lossy()));
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.push(SourceFile {
            relative: rel.to_string_lossy().into_owned(),
            stem,
            extension: extension.to_string(),
            in_test_dir,
            path: path.to_path_buf(),
        });
    }
    out
}

fn has_inline_tests(path: &Path) -> bool {
    std::fs::read_to_string(path)
        .map(|s| s.contains("#[cfg(test)]"))
        .unwrap_or(false)
}

fn detect_test_pattern(root: &Path, files: &[SourceFile]) -> Option<String> {
    let has_test = |ext: &str| files.iter().any(|f| f.is_test() && f.extension == ext);
    if root.join("Cargo.toml").exists() || has_test("rs") {
        return Some("cargo test".to_string());
    }
    if has_test("py") {
        return Some("pytest".to_string());
    }
    let package_json = std::fs::read_to_string(root.join("package.json")).unwrap_or_default();
    if package_json.contains("jest") || has_test("js") || has_test("ts") {
        return Some("jest".to_string());
    }
    if has_test("go") {
        return Some("go test".to_string());
    }
    None
}
