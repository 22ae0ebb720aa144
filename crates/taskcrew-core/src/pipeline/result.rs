//! Structured run output. Every run ends in one of these, even on failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decision::MergeDecision;
use super::state::PipelineState;
use crate::approval::{ApprovalCheckpoint, CheckpointStatus};
use crate::classifier::TaskClassification;
use crate::collaborators::{FeedbackItem, IntegrationRequest};
use crate::hurdles::{Hurdle, HurdleLog};
use crate::lifecycle::{PeerReview, PerformanceSummary};
use crate::roles::{Phase, Role};

/// The request text plus feedback folded in between iterations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub text: String,
    pub feedback: Vec<String>,
}

impl TaskRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            feedback: Vec::new(),
        }
    }

    pub fn with_feedback(mut self, digest: impl Into<String>) -> Self {
        self.feedback.push(digest.into());
        self
    }

    /// What the roles see: the original text followed by any feedback.
    pub fn full_text(&self) -> String {
        if self.feedback.is_empty() {
            return self.text.clone();
        }
        format!(
            "{}\n\n**Previous Iteration Feedback:**\n{}",
            self.text,
            self.feedback.join("\n")
        )
    }
}

/// One executed phase. Never edited once pushed onto a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub role: Role,
    pub lineage_id: Option<Uuid>,
    pub output_text: String,
    pub succeeded: bool,
    pub hurdles: Vec<Hurdle>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunErrorKind {
    ApprovalRejected,
    PhaseExecution,
    Integration,
}

impl std::fmt::Display for RunErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ApprovalRejected => "approval_rejected",
            Self::PhaseExecution => "phase_execution",
            Self::Integration => "integration",
        };
        write!(f, "{s}")
    }
}

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: RunErrorKind,
    pub phase: Option<Phase>,
    pub message: String,
}

impl RunError {
    pub fn new(kind: RunErrorKind, phase: Option<Phase>, message: impl Into<String>) -> Self {
        Self {
            kind,
            phase,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.phase {
            Some(phase) => write!(f, "{} in {phase}: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationOutcome {
    pub branch: String,
    pub request: Option<IntegrationRequest>,
    pub files_committed: usize,
    pub reviews_posted: Vec<FeedbackItem>,
    pub unresolved_feedback: Vec<FeedbackItem>,
    pub has_unresolved_feedback: bool,
    pub decision: Option<MergeDecision>,
    pub decision_text: Option<String>,
    pub merged: bool,
    /// The merge was withheld after a decision was reached.
    pub deferred: bool,
    pub error: Option<String>,
}

impl IntegrationOutcome {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub iteration: u32,
    pub request: String,
    pub classification: TaskClassification,
    pub final_state: PipelineState,
    pub phase_results: Vec<PhaseResult>,
    pub skipped_phases: Vec<Phase>,
    pub plan: Option<String>,
    pub implementation: Option<String>,
    pub review: Option<String>,
    pub test_results: Option<String>,
    /// `None` when the Test phase did not run.
    pub tests_passed: Option<bool>,
    pub hurdles: HurdleLog,
    pub checkpoints: Vec<ApprovalCheckpoint>,
    pub peer_reviews: Vec<PeerReview>,
    pub integration: Option<IntegrationOutcome>,
    pub performance_report: Vec<PerformanceSummary>,
    pub error: Option<RunError>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunResult {
    pub fn new(
        run_id: impl Into<String>,
        iteration: u32,
        request: impl Into<String>,
        classification: TaskClassification,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            iteration,
            request: request.into(),
            skipped_phases: classification.skipped_phases(),
            classification,
            final_state: PipelineState::Classify,
            phase_results: Vec::new(),
            plan: None,
            implementation: None,
            review: None,
            test_results: None,
            tests_passed: None,
            hurdles: HurdleLog::default(),
            checkpoints: Vec::new(),
            peer_reviews: Vec::new(),
            integration: None,
            performance_report: Vec::new(),
            error: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.final_state == PipelineState::Done
    }

    pub fn merged(&self) -> bool {
        self.integration.as_ref().is_some_and(|i| i.merged)
    }

    /// The last phase result for `phase`.
    pub fn phase_result(&self, phase: Phase) -> Option<&PhaseResult> {
        self.phase_results.iter().rev().find(|r| r.phase == phase)
    }

    /// Output of `phase`, if it produced any.
    pub fn output(&self, phase: Phase) -> Option<&str> {
        match phase {
            Phase::Plan => self.plan.as_deref(),
            Phase::Build => self.implementation.as_deref(),
            Phase::Review => self.review.as_deref(),
            Phase::Test => self.test_results.as_deref(),
            Phase::Integrate => self
                .integration
                .as_ref()
                .and_then(|i| i.decision_text.as_deref()),
        }
    }

    /// Build ran and succeeded (or was not required), and tests did not fail.
    pub fn build_succeeded(&self) -> bool {
        let build_ok = if self.classification.is_active(Phase::Build) {
            self.phase_result(Phase::Build).is_some_and(|r| r.succeeded)
        } else {
            true
        };
        build_ok && self.tests_passed != Some(false)
    }

    /// A rejected gate, a deferred merge, or a failed run.
    pub fn has_pending_rejection(&self) -> bool {
        let rejected = self
            .checkpoints
            .iter()
            .any(|c| matches!(c.status, CheckpointStatus::Rejected { .. }));
        let deferred = self.integration.as_ref().is_some_and(|i| i.deferred);
        rejected || deferred || self.final_state == PipelineState::Failed
    }
}
