//! Approval checkpoints: one record per gate invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{ApprovalError, ApprovalResult};
use crate::hurdles::Hurdle;
use crate::roles::Phase;

/// Which transition a checkpoint guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    Plan,
    Implementation,
    PreIntegration,
}

impl CheckpointKind {
    /// The checkpoint kind guarding progress out of `phase`.
    pub fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::Plan => Self::Plan,
            Phase::Build | Phase::Review | Phase::Test => Self::Implementation,
            Phase::Integrate => Self::PreIntegration,
        }
    }
}

impl std::fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plan => write!(f, "plan_approval"),
            Self::Implementation => write!(f, "implementation_approval"),
            Self::PreIntegration => write!(f, "pre_integration_approval"),
        }
    }
}

/// Status of a checkpoint. Pending resolves once; it never reverts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Approved,
    Rejected { reason: String },
}

impl CheckpointStatus {
    /// Whether the checkpoint allows execution to proceed.
    pub fn allows_proceed(&self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Whether the checkpoint is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected { reason } => write!(f, "rejected ({reason})"),
        }
    }
}

/// What the approver is shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    /// Short human-readable summary of the gated work.
    pub summary: String,
    /// Free-form structured details (stats, excerpts).
    pub details: serde_json::Value,
    /// Hurdles that triggered or accompany the gate.
    pub hurdles: Vec<Hurdle>,
}

impl CheckpointPayload {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            details: serde_json::Value::Null,
            hurdles: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_hurdles(mut self, hurdles: Vec<Hurdle>) -> Self {
        self.hurdles = hurdles;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalCheckpoint {
    pub checkpoint_id: String,
    pub kind: CheckpointKind,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub status: CheckpointStatus,
    pub payload: CheckpointPayload,
}

impl ApprovalCheckpoint {
    /// Create a new pending checkpoint.
    pub fn new(kind: CheckpointKind, label: impl Into<String>, payload: CheckpointPayload) -> Self {
        Self {
            checkpoint_id: Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            created_at: Utc::now(),
            resolved_at: None,
            status: CheckpointStatus::Pending,
            payload,
        }
    }

    /// Move from Pending to a terminal status.
    pub fn resolve(&mut self, status: CheckpointStatus) -> ApprovalResult<()> {
        if self.status.is_terminal() {
            return Err(ApprovalError::AlreadyResolved {
                checkpoint_id: self.checkpoint_id.clone(),
                status: self.status.to_string(),
            });
        }
        if !status.is_terminal() {
            return Err(ApprovalError::InvalidResolution {
                checkpoint_id: self.checkpoint_id.clone(),
            });
        }
        self.status = status;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}
