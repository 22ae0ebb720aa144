//! Version-control / integration-request collaborator.

use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

const GIT_USER: &str = "user.name=taskcrew";
const GIT_EMAIL: &str = "user.email=taskcrew@localhost";

/// Words that mark a review comment as asking for changes.
const ISSUE_KEYWORDS: &[&str] = &[
    "fix", "issue", "bug", "problem", "error", "must", "should", "todo", "concern",
];

/// Words that mark a review comment as settled.
const SETTLED_MARKERS: &[&str] = &["resolved", "approved"];

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("branch {0} already exists")]
    BranchExists(String),

    #[error("merge conflict: {0}")]
    Conflict(String),

    #[error("integration request #{0} is not mergeable")]
    NotMergeable(u64),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("integration request #{0} not found")]
    NotFound(u64),

    #[error("invalid artifact path: {0}")]
    InvalidPath(String),

    #[error("integration backend error: {0}")]
    Backend(String),
}

pub type IntegrationResult<T> = std::result::Result<T, IntegrationError>;

/// A generated file to commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub content: String,
}

impl Artifact {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationRequest {
    pub number: u64,
    pub url: String,
    pub title: String,
    pub body: String,
    pub branch: String,
    pub base: String,
}

/// A review comment posted on an integration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub author: String,
    pub body: String,
}

impl FeedbackItem {
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        is_unresolved_feedback(&self.body)
    }
}

/// True when `text` raises an issue and carries no resolved/approved marker.
pub fn is_unresolved_feedback(text: &str) -> bool {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .collect();
    let raises_issue = ISSUE_KEYWORDS
        .iter()
        .any(|k| words.iter().any(|w| w.starts_with(k)));
    let settled = SETTLED_MARKERS.iter().any(|m| lowered.contains(m));
    raises_issue && !settled
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMethod {
    #[default]
    Squash,
    Rebase,
    Merge,
}

impl MergeMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "squash" => Some(Self::Squash),
            "rebase" => Some(Self::Rebase),
            "merge" => Some(Self::Merge),
            _ => None,
        }
    }
}

impl std::fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Squash => "squash",
            Self::Rebase => "rebase",
            Self::Merge => "merge",
        };
        write!(f, "{s}")
    }
}

#[async_trait]
pub trait IntegrationCollaborator: Send + Sync {
    async fn create_branch(&self, name: &str, base: &str) -> IntegrationResult<()>;

    /// Commit `files` on `branch`; returns the number of files written.
    async fn commit_files(
        &self,
        branch: &str,
        files: &[Artifact],
        message: &str,
    ) -> IntegrationResult<usize>;

    async fn open_integration_request(
        &self,
        branch: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> IntegrationResult<IntegrationRequest>;

    async fn post_comment(&self, number: u64, author: &str, body: &str) -> IntegrationResult<()>;

    async fn list_unresolved_feedback(&self, number: u64) -> IntegrationResult<Vec<FeedbackItem>>;

    async fn merge(&self, number: u64, method: MergeMethod, message: &str)
        -> IntegrationResult<()>;
}

#[derive(Debug, Clone)]
pub(crate) struct StoredRequest {
    pub request: IntegrationRequest,
    pub comments: Vec<FeedbackItem>,
    pub merged: bool,
}

/// In-memory bookkeeping of integration requests and their comments.
#[derive(Debug, Default)]
pub(crate) struct RequestBook {
    requests: Mutex<Vec<StoredRequest>>,
}

impl RequestBook {
    pub fn open(
        &self,
        url_prefix: &str,
        branch: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> IntegrationResult<IntegrationRequest> {
        let mut requests = self.lock()?;
        let number = requests.len() as u64 + 1;
        let request = IntegrationRequest {
            number,
            url: format!("{url_prefix}{number}"),
            title: title.to_string(),
            body: body.to_string(),
            branch: branch.to_string(),
            base: base.to_string(),
        };
        requests.push(StoredRequest {
            request: request.clone(),
            comments: Vec::new(),
            merged: false,
        });
        Ok(request)
    }

    pub fn comment(&self, number: u64, item: FeedbackItem) -> IntegrationResult<()> {
        self.with_request(number, |r| r.comments.push(item))
    }

    pub fn unresolved(&self, number: u64) -> IntegrationResult<Vec<FeedbackItem>> {
        self.with_request(number, |r| {
            r.comments
                .iter()
                .filter(|c| c.is_unresolved())
                .cloned()
                .collect()
        })
    }

    /// Look up an unmerged request for merging.
    pub fn mergeable(&self, number: u64) -> IntegrationResult<IntegrationRequest> {
        self.with_request(number, |r| (r.merged, r.request.clone()))
            .and_then(|(merged, request)| {
                if merged {
                    Err(IntegrationError::NotMergeable(number))
                } else {
                    Ok(request)
                }
            })
    }

    pub fn mark_merged(&self, number: u64) -> IntegrationResult<()> {
        self.with_request(number, |r| r.merged = true)
    }

    pub fn snapshot(&self) -> Vec<StoredRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn with_request<T>(
        &self,
        number: u64,
        f: impl FnOnce(&mut StoredRequest) -> T,
    ) -> IntegrationResult<T> {
        let mut requests = self.lock()?;
        requests
            .iter_mut()
            .find(|r| r.request.number == number)
            .map(f)
            .ok_or(IntegrationError::NotFound(number))
    }

    fn lock(&self) -> IntegrationResult<std::sync::MutexGuard<'_, Vec<StoredRequest>>> {
        self.requests
            .lock()
            .map_err(|_| IntegrationError::Backend("request book lock poisoned".to_string()))
    }
}

/// Accepts every call and stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIntegration;

#[async_trait]
impl IntegrationCollaborator for NoopIntegration {
    async fn create_branch(&self, _name: &str, _base: &str) -> IntegrationResult<()> {
        Ok(())
    }

    async fn commit_files(
        &self,
        _branch: &str,
        files: &[Artifact],
        _message: &str,
    ) -> IntegrationResult<usize> {
        Ok(files.len())
    }

    async fn open_integration_request(
        &self,
        branch: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> IntegrationResult<IntegrationRequest> {
        Ok(IntegrationRequest {
            number: 0,
            url: String::new(),
            title: title.to_string(),
            body: body.to_string(),
            branch: branch.to_string(),
            base: base.to_string(),
        })
    }

    async fn post_comment(
        &self,
        _number: u64,
        _author: &str,
        _body: &str,
    ) -> IntegrationResult<()> {
        Ok(())
    }

    async fn list_unresolved_feedback(&self, _number: u64) -> IntegrationResult<Vec<FeedbackItem>> {
        Ok(Vec::new())
    }

    async fn merge(
        &self,
        _number: u64,
        _method: MergeMethod,
        _message: &str,
    ) -> IntegrationResult<()> {
        Ok(())
    }
}

/// Git work tree on the local filesystem. Integration requests and their
/// comments live in memory; branches, commits and merges are real.
#[derive(Debug)]
pub struct LocalGitIntegration {
    work_tree: PathBuf,
    repository: Option<String>,
    book: RequestBook,
}

impl LocalGitIntegration {
    pub fn new(work_tree: impl Into<PathBuf>) -> Self {
        Self {
            work_tree: work_tree.into(),
            repository: None,
            book: RequestBook::default(),
        }
    }

    /// Name requests after `slug` (e.g. `acme/calc-cli`) instead of the work tree path.
    pub fn with_repository(mut self, slug: impl Into<String>) -> Self {
        self.repository = Some(slug.into());
        self
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    fn request_prefix(&self) -> String {
        match &self.repository {
            Some(slug) => format!("{slug}#request-"),
            None => format!("file://{}#request-", self.work_tree.display()),
        }
    }

    async fn git(&self, args: Vec<String>) -> IntegrationResult<String> {
        let dir = self.work_tree.clone();
        tokio::task::spawn_blocking(move || run_git(&dir, &args))
            .await
            .map_err(|e| IntegrationError::Backend(e.to_string()))?
    }

    async fn branch_exists(&self, name: &str) -> bool {
        self.git(args(&["rev-parse", "--verify", "--quiet", &format!("refs/heads/{name}")]))
            .await
            .is_ok()
    }

    /// Initialise the work tree with an empty commit on `base` when needed.
    ///
    /// Only a `.git` directly inside the work tree counts, so an output
    /// directory nested in another checkout gets its own repository.
    async fn ensure_repo(&self, base: &str) -> IntegrationResult<()> {
        tokio::fs::create_dir_all(&self.work_tree)
            .await
            .map_err(|e| IntegrationError::Backend(e.to_string()))?;
        if self.work_tree.join(".git").exists() {
            return Ok(());
        }
        info!(path = %self.work_tree.display(), "initialising git work tree");
        self.git(args(&["init", "--quiet"])).await?;
        self.git(args(&["checkout", "--quiet", "-B", base])).await?;
        self.git(commit_args(&["--allow-empty", "-m", "Initial commit"]))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl IntegrationCollaborator for LocalGitIntegration {
    #[instrument(skip(self))]
    async fn create_branch(&self, name: &str, base: &str) -> IntegrationResult<()> {
        self.ensure_repo(base).await?;
        if self.branch_exists(name).await {
            return Err(IntegrationError::BranchExists(name.to_string()));
        }
        let start = if self.branch_exists(base).await { base } else { "HEAD" };
        self.git(args(&["checkout", "--quiet", "-b", name, start])).await?;
        Ok(())
    }

    #[instrument(skip(self, files, message), fields(files = files.len()))]
    async fn commit_files(
        &self,
        branch: &str,
        files: &[Artifact],
        message: &str,
    ) -> IntegrationResult<usize> {
        self.git(args(&["checkout", "--quiet", branch])).await?;
        let mut paths = Vec::with_capacity(files.len());
        for artifact in files {
            let relative = safe_relative(&artifact.path)?;
            let target = self.work_tree.join(&relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| IntegrationError::Backend(e.to_string()))?;
            }
            tokio::fs::write(&target, &artifact.content)
                .await
                .map_err(|e| IntegrationError::Backend(e.to_string()))?;
            paths.push(relative.to_string_lossy().into_owned());
        }
        if paths.is_empty() {
            return Ok(0);
        }
        let mut add = args(&["add", "--"]);
        add.extend(paths.iter().cloned());
        self.git(add).await?;
        self.git(commit_args(&["--allow-empty", "-m", message])).await?;
        debug!(count = paths.len(), "files committed");
        Ok(paths.len())
    }

    async fn open_integration_request(
        &self,
        branch: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> IntegrationResult<IntegrationRequest> {
        self.book
            .open(&self.request_prefix(), branch, base, title, body)
    }

    async fn post_comment(&self, number: u64, author: &str, body: &str) -> IntegrationResult<()> {
        self.book.comment(number, FeedbackItem::new(author, body))
    }

    async fn list_unresolved_feedback(&self, number: u64) -> IntegrationResult<Vec<FeedbackItem>> {
        self.book.unresolved(number)
    }

    #[instrument(skip(self, message))]
    async fn merge(
        &self,
        number: u64,
        method: MergeMethod,
        message: &str,
    ) -> IntegrationResult<()> {
        let request = self.book.mergeable(number)?;
        let (branch, base) = (request.branch.as_str(), request.base.as_str());
        if !self.branch_exists(base).await {
            self.git(args(&["branch", base, "HEAD"])).await?;
        }

        let outcome = match method {
            MergeMethod::Squash => {
                self.git(args(&["checkout", "--quiet", base])).await?;
                match self.git(args(&["merge", "--squash", branch])).await {
                    Ok(_) => self
                        .git(commit_args(&["--allow-empty", "-m", message]))
                        .await
                        .map(|_| ()),
                    Err(e) => Err(e),
                }
            }
            MergeMethod::Merge => {
                self.git(args(&["checkout", "--quiet", base])).await?;
                self.git(merge_args(&["merge", "--no-ff", "-m", message, branch]))
                    .await
                    .map(|_| ())
            }
            MergeMethod::Rebase => {
                match self.git(merge_args(&["rebase", "--quiet", base, branch])).await {
                    Ok(_) => {
                        self.git(args(&["checkout", "--quiet", base])).await?;
                        self.git(args(&["merge", "--ff-only", branch]))
                            .await
                            .map(|_| ())
                    }
                    Err(e) => Err(e),
                }
            }
        };

        if let Err(e) = outcome {
            // a squash leaves no MERGE_HEAD, so `merge --abort` cannot undo it
            let abort = match method {
                MergeMethod::Squash => args(&["reset", "--merge"]),
                MergeMethod::Merge => args(&["merge", "--abort"]),
                MergeMethod::Rebase => args(&["rebase", "--abort"]),
            };
            if let Err(cleanup) = self.git(abort).await {
                warn!(number, %method, error = %cleanup, "work tree left mid-merge");
            }
            return Err(IntegrationError::Conflict(e.to_string()));
        }
        self.book.mark_merged(number)?;
        info!(number, %method, "integration request merged");
        Ok(())
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn commit_args(rest: &[&str]) -> Vec<String> {
    let mut out = args(&["-c", GIT_USER, "-c", GIT_EMAIL, "commit", "--quiet"]);
    out.extend(args(rest));
    out
}

fn merge_args(rest: &[&str]) -> Vec<String> {
    let mut out = args(&["-c", GIT_USER, "-c", GIT_EMAIL]);
    out.extend(args(rest));
    out
}

fn run_git(dir: &Path, args: &[String]) -> IntegrationResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| IntegrationError::Backend(format!("failed to run git: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let verb = args.iter().find(|a| !a.starts_with('-') && !a.contains('='));
        return Err(IntegrationError::Backend(format!(
            "git {} failed: {}",
            verb.map(String::as_str).unwrap_or("command"),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Reject absolute paths and `..` so artifacts stay inside the work tree.
fn safe_relative(path: &str) -> IntegrationResult<PathBuf> {
    let candidate = Path::new(path.trim());
    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(IntegrationError::InvalidPath(path.to_string())),
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(IntegrationError::InvalidPath(path.to_string()));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_without_marker_is_unresolved() {
        assert!(is_unresolved_feedback("Please fix the error handling in parse()"));
        assert!(is_unresolved_feedback("You should add input validation"));
    }

    #[test]
    fn test_markers_settle_feedback() {
        assert!(!is_unresolved_feedback("The fix looks good, approved"));
        assert!(!is_unresolved_feedback("Issue resolved in latest commit"));
        assert!(!is_unresolved_feedback("Clean implementation, ready to ship"));
    }

    #[test]
    fn test_merge_method_parse() {
        assert_eq!(MergeMethod::parse(" Rebase "), Some(MergeMethod::Rebase));
        assert_eq!(MergeMethod::parse("octopus"), None);
        assert_eq!(MergeMethod::default(), MergeMethod::Squash);
    }

    #[test]
    fn test_safe_relative_paths() {
        assert_eq!(safe_relative("./src/main.rs").unwrap(), PathBuf::from("src/main.rs"));
        assert!(safe_relative("../etc/passwd").is_err());
        assert!(safe_relative("/etc/passwd").is_err());
        assert!(safe_relative("").is_err());
    }

    #[test]
    fn test_request_book_merge_once() {
        let book = RequestBook::default();
        let req = book.open("mem://", "feature/x", "main", "t", "b").unwrap();
        assert_eq!(req.number, 1);
        book.mergeable(1).unwrap();
        book.mark_merged(1).unwrap();
        assert!(matches!(book.mergeable(1), Err(IntegrationError::NotMergeable(1))));
        assert!(matches!(
            book.comment(9, FeedbackItem::new("a", "b")),
            Err(IntegrationError::NotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_repository_names_request_urls() {
        let dir = tempfile::tempdir().unwrap();
        let plain = LocalGitIntegration::new(dir.path());
        let req = plain
            .open_integration_request("feature/x", "main", "t", "b")
            .await
            .unwrap();
        assert!(req.url.starts_with("file://"));

        let named = LocalGitIntegration::new(dir.path()).with_repository("acme/calc-cli");
        let req = named
            .open_integration_request("feature/x", "main", "t", "b")
            .await
            .unwrap();
        assert_eq!(req.url, "acme/calc-cli#request-1");
    }

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[tokio::test]
    async fn test_conflicting_squash_leaves_a_clean_base() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let git = LocalGitIntegration::new(dir.path());
        for (branch, body) in [("feature/a", "pub fn a() {}\n"), ("feature/b", "pub fn b() {}\n")] {
            git.create_branch(branch, "main").await.unwrap();
            git.commit_files(branch, &[Artifact::new("src/lib.rs", body)], branch)
                .await
                .unwrap();
        }

        let first = git
            .open_integration_request("feature/a", "main", "a", "")
            .await
            .unwrap();
        git.merge(first.number, MergeMethod::Squash, "Add a").await.unwrap();

        let second = git
            .open_integration_request("feature/b", "main", "b", "")
            .await
            .unwrap();
        let err = git
            .merge(second.number, MergeMethod::Squash, "Add b")
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Conflict(_)));

        let status = run_git(dir.path(), &args(&["status", "--porcelain"])).unwrap();
        assert!(status.is_empty(), "unexpected changes: {status}");
        let lib = std::fs::read_to_string(dir.path().join("src/lib.rs")).unwrap();
        assert_eq!(lib, "pub fn a() {}\n");
    }
}
