//! Deterministic collaborators for tests and dry runs
//!
//! - `ScriptedExecutor`: canned replies per role and phase, recording every call
//! - `MemoryIntegration`: branches, commits and requests kept in memory
//! - `RecordingNotifier`: keeps every event it is sent

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::collaborators::integration::RequestBook;
use crate::collaborators::{
    Artifact, ExecutionError, ExecutionOutput, ExecutionResult, FeedbackItem,
    IntegrationCollaborator, IntegrationError, IntegrationRequest, IntegrationResult, MergeMethod,
    NotificationEvent, NotificationKind, Notifier, NotifyResult, RoleExecutor, RoleInvocation,
};
use crate::roles::{Phase, Role};

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

const CANNED_PLAN: &str = "## Plan\n1. Define the public interface\n2. Implement the core logic\n3. Cover it with tests";
const CANNED_BUILD: &str = "Implementation complete.\n\n```rust:src/lib.rs\npub fn add(a: i64, b: i64) -> i64 {\n    a + b\n}\n```\n";
const CANNED_REVIEW: &str = "The implementation is small and readable.\nComplexity: 2\nReadability: 9\nMaintainability: 8\nDRY violations: 0";
const CANNED_TEST: &str = "```rust:tests/add.rs\n#[test]\nfn adds() {\n    assert_eq!(mylib::add(2, 2), 4);\n}\n```\nAll tests passed.";
const CANNED_DRAFT: &str = "Title: Add arithmetic helpers\nDescription: Adds `add` with tests.";
const CANNED_COMMENT: &str = "Looks good to me, approved.";
const CANNED_DECISION: &str = "DECISION: APPROVED\nMerge method: squash\nCommit message: Add arithmetic helpers";

enum Reply {
    Text(String),
    Fail(fn() -> ExecutionError),
}

/// Executor answering from per-(role, phase) scripts.
///
/// Scripted replies are consumed in order; once a script is exhausted the
/// executor falls back to a canned reply that keeps the pipeline moving.
#[derive(Default)]
pub struct ScriptedExecutor {
    model: String,
    scripts: Mutex<HashMap<(Role, Phase), VecDeque<Reply>>>,
    calls: Mutex<Vec<RoleInvocation>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            model: "scripted".to_string(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Queue `text` as the next reply for `role` in `phase`.
    pub fn reply(self, role: Role, phase: Phase, text: impl Into<String>) -> Self {
        self.push(role, phase, Reply::Text(text.into()))
    }

    /// Queue a failure as the next reply for `role` in `phase`.
    pub fn fail(self, role: Role, phase: Phase, error: fn() -> ExecutionError) -> Self {
        self.push(role, phase, Reply::Fail(error))
    }

    fn push(self, role: Role, phase: Phase, reply: Reply) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry((role, phase))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<RoleInvocation> {
        self.calls.lock().unwrap().clone()
    }

    /// The phases invoked, in call order.
    pub fn phases_called(&self) -> Vec<Phase> {
        self.calls().iter().map(|c| c.phase).collect()
    }

    fn canned(invocation: &RoleInvocation) -> &'static str {
        match (invocation.phase, invocation.role) {
            (Phase::Plan, _) => CANNED_PLAN,
            (Phase::Build, _) => CANNED_BUILD,
            (Phase::Review, _) => CANNED_REVIEW,
            (Phase::Test, _) => CANNED_TEST,
            (Phase::Integrate, Role::Integrator) if invocation.prompt.contains("DECISION:") => {
                CANNED_DECISION
            }
            (Phase::Integrate, Role::Integrator) => CANNED_DRAFT,
            (Phase::Integrate, _) => CANNED_COMMENT,
        }
    }
}

#[async_trait]
impl RoleExecutor for ScriptedExecutor {
    fn model(&self) -> &str {
        &self.model
    }

    async fn execute(&self, invocation: &RoleInvocation) -> ExecutionResult<ExecutionOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&(invocation.role, invocation.phase))
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Reply::Text(text)) => Ok(ExecutionOutput::text(text)),
            Some(Reply::Fail(error)) => Err(error()),
            None => Ok(ExecutionOutput::text(Self::canned(invocation))),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryIntegration
// ---------------------------------------------------------------------------

/// One recorded commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub branch: String,
    pub files: Vec<Artifact>,
    pub message: String,
}

/// One recorded merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRecord {
    pub number: u64,
    pub method: MergeMethod,
    pub message: String,
}

#[derive(Debug, Default)]
struct IntegrationTables {
    branches: HashSet<String>,
    commits: Vec<CommitRecord>,
    merges: Vec<MergeRecord>,
}

/// In-memory integration collaborator.
#[derive(Debug, Default)]
pub struct MemoryIntegration {
    book: RequestBook,
    tables: Mutex<IntegrationTables>,
    preset_feedback: Vec<FeedbackItem>,
    refuse_merge: bool,
}

impl MemoryIntegration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `name` already exists remotely.
    pub fn with_existing_branch(self, name: impl Into<String>) -> Self {
        self.tables.lock().unwrap().branches.insert(name.into());
        self
    }

    /// Comment added to every request as soon as it is opened.
    pub fn with_preset_feedback(mut self, item: FeedbackItem) -> Self {
        self.preset_feedback.push(item);
        self
    }

    /// Make every merge fail with `NotMergeable`.
    pub fn refusing_merges(mut self) -> Self {
        self.refuse_merge = true;
        self
    }

    pub fn branches(&self) -> Vec<String> {
        let mut branches: Vec<String> =
            self.tables.lock().unwrap().branches.iter().cloned().collect();
        branches.sort();
        branches
    }

    pub fn commits(&self) -> Vec<CommitRecord> {
        self.tables.lock().unwrap().commits.clone()
    }

    pub fn merges(&self) -> Vec<MergeRecord> {
        self.tables.lock().unwrap().merges.clone()
    }

    pub fn requests(&self) -> Vec<IntegrationRequest> {
        self.book.snapshot().into_iter().map(|r| r.request).collect()
    }

    pub fn comments(&self, number: u64) -> Vec<FeedbackItem> {
        self.book
            .snapshot()
            .into_iter()
            .find(|r| r.request.number == number)
            .map(|r| r.comments)
            .unwrap_or_default()
    }

    pub fn is_merged(&self, number: u64) -> bool {
        self.book
            .snapshot()
            .iter()
            .any(|r| r.request.number == number && r.merged)
    }
}

#[async_trait]
impl IntegrationCollaborator for MemoryIntegration {
    async fn create_branch(&self, name: &str, _base: &str) -> IntegrationResult<()> {
        if self.tables.lock().unwrap().branches.insert(name.to_string()) {
            Ok(())
        } else {
            Err(IntegrationError::BranchExists(name.to_string()))
        }
    }

    async fn commit_files(
        &self,
        branch: &str,
        files: &[Artifact],
        message: &str,
    ) -> IntegrationResult<usize> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.branches.contains(branch) {
            return Err(IntegrationError::Backend(format!("unknown branch {branch}")));
        }
        tables.commits.push(CommitRecord {
            branch: branch.to_string(),
            files: files.to_vec(),
            message: message.to_string(),
        });
        Ok(files.len())
    }

    async fn open_integration_request(
        &self,
        branch: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> IntegrationResult<IntegrationRequest> {
        let request = self.book.open("memory://requests/", branch, base, title, body)?;
        for item in &self.preset_feedback {
            self.book.comment(request.number, item.clone())?;
        }
        Ok(request)
    }

    async fn post_comment(&self, number: u64, author: &str, body: &str) -> IntegrationResult<()> {
        self.book.comment(number, FeedbackItem::new(author, body))
    }

    async fn list_unresolved_feedback(&self, number: u64) -> IntegrationResult<Vec<FeedbackItem>> {
        self.book.unresolved(number)
    }

    async fn merge(
        &self,
        number: u64,
        method: MergeMethod,
        message: &str,
    ) -> IntegrationResult<()> {
        self.book.mergeable(number)?;
        if self.refuse_merge {
            return Err(IntegrationError::NotMergeable(number));
        }
        self.book.mark_merged(number)?;
        self.tables.lock().unwrap().merges.push(MergeRecord {
            number,
            method,
            message: message.to_string(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.events().iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, event: &NotificationEvent) -> NotifyResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
