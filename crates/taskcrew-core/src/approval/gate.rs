//! The approval gate and its decision sources.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use super::checkpoint::{ApprovalCheckpoint, CheckpointStatus};
use crate::metrics::METRICS;
use crate::obs;

/// An external accept/reject answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

impl Decision {
    /// Interpret a typed answer: `y`, `yes` or `approve` approves.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" | "approve" | "approved" => Self::Approve,
            other => Self::Reject {
                reason: if other.is_empty() {
                    "declined".to_string()
                } else {
                    format!("declined: {other}")
                },
            },
        }
    }
}

/// Where decisions come from.
///
/// Returns `None` when no signal can be obtained (closed input, detached
/// terminal). The gate then applies its [`NonInteractivePolicy`].
#[async_trait]
pub trait DecisionSource: Send + Sync {
    async fn decide(&self, checkpoint: &ApprovalCheckpoint) -> Option<Decision>;
}

/// What to do when a decision source yields no signal.
///
/// `Approve` is the fail-open default kept so unattended runs never deadlock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonInteractivePolicy {
    #[default]
    Approve,
    Reject,
}

/// Synchronous checkpoint before a sensitive transition.
#[derive(Clone)]
pub struct ApprovalGate {
    auto_approve: bool,
    on_no_signal: NonInteractivePolicy,
    source: Arc<dyn DecisionSource>,
}

impl std::fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGate")
            .field("auto_approve", &self.auto_approve)
            .field("on_no_signal", &self.on_no_signal)
            .finish()
    }
}

impl ApprovalGate {
    pub fn new(source: Arc<dyn DecisionSource>, on_no_signal: NonInteractivePolicy) -> Self {
        Self {
            auto_approve: false,
            on_no_signal,
            source,
        }
    }

    /// A gate that approves everything without consulting any source.
    pub fn auto_approve() -> Self {
        Self {
            auto_approve: true,
            on_no_signal: NonInteractivePolicy::Approve,
            source: Arc::new(NoSignalSource),
        }
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    pub fn is_auto_approve(&self) -> bool {
        self.auto_approve
    }

    /// Resolve `checkpoint` and report whether execution may proceed.
    ///
    /// An already-resolved checkpoint is left untouched and its existing
    /// status is reported.
    #[instrument(skip(self, checkpoint), fields(kind = %checkpoint.kind))]
    pub async fn request(&self, checkpoint: &mut ApprovalCheckpoint) -> bool {
        if checkpoint.status.is_terminal() {
            return checkpoint.status.allows_proceed();
        }
        METRICS.inc_gates_raised();

        let status = if self.auto_approve {
            CheckpointStatus::Approved
        } else {
            match self.source.decide(checkpoint).await {
                Some(Decision::Approve) => CheckpointStatus::Approved,
                Some(Decision::Reject { reason }) => CheckpointStatus::Rejected { reason },
                None => match self.on_no_signal {
                    NonInteractivePolicy::Approve => {
                        warn!(
                            checkpoint = %checkpoint.kind,
                            "no approval input available, approving by policy"
                        );
                        CheckpointStatus::Approved
                    }
                    NonInteractivePolicy::Reject => CheckpointStatus::Rejected {
                        reason: "no approval input available".to_string(),
                    },
                },
            }
        };

        if let Err(e) = checkpoint.resolve(status) {
            warn!(error = %e, "checkpoint resolution failed");
            return checkpoint.status.allows_proceed();
        }
        obs::emit_gate_decided(
            &checkpoint.checkpoint_id,
            &checkpoint.kind.to_string(),
            &checkpoint.status.to_string(),
            self.auto_approve,
        );
        checkpoint.status.allows_proceed()
    }
}

/// Source that never produces a signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignalSource;

#[async_trait]
impl DecisionSource for NoSignalSource {
    async fn decide(&self, _checkpoint: &ApprovalCheckpoint) -> Option<Decision> {
        None
    }
}

/// Prompts on stderr and reads one line from stdin. EOF yields no signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinDecisionSource;

#[async_trait]
impl DecisionSource for StdinDecisionSource {
    async fn decide(&self, checkpoint: &ApprovalCheckpoint) -> Option<Decision> {
        let prompt = format!(
            "\n[{}] {}\n{}\nApprove? (yes/no): ",
            checkpoint.kind, checkpoint.label, checkpoint.payload.summary
        );
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(prompt.as_bytes());
            let _ = stderr.flush();
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line),
            }
        })
        .await
        .ok()
        .flatten()?;
        Some(Decision::from_answer(&answer))
    }
}

/// Replays a fixed list of answers; `None` entries and exhaustion mean no signal.
#[derive(Debug, Default)]
pub struct ScriptedDecisionSource {
    answers: Mutex<VecDeque<Option<Decision>>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedDecisionSource {
    pub fn new(answers: impl IntoIterator<Item = Option<Decision>>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Labels of every checkpoint this source was asked about.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DecisionSource for ScriptedDecisionSource {
    async fn decide(&self, checkpoint: &ApprovalCheckpoint) -> Option<Decision> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(checkpoint.label.clone());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::checkpoint::{CheckpointKind, CheckpointPayload};
    use std::time::Duration;

    /// Would block forever if consulted.
    struct NeverAnswers;

    #[async_trait]
    impl DecisionSource for NeverAnswers {
        async fn decide(&self, _checkpoint: &ApprovalCheckpoint) -> Option<Decision> {
            std::future::pending().await
        }
    }

    fn checkpoint() -> ApprovalCheckpoint {
        ApprovalCheckpoint::new(
            CheckpointKind::Implementation,
            "implementation ready",
            CheckpointPayload::new("4 files"),
        )
    }

    #[tokio::test]
    async fn test_auto_approve_never_consults_source() {
        let gate = ApprovalGate::new(Arc::new(NeverAnswers), NonInteractivePolicy::Reject)
            .with_auto_approve(true);
        let mut cp = checkpoint();
        let approved = tokio::time::timeout(Duration::from_millis(50), gate.request(&mut cp))
            .await
            .expect("auto-approve must not block");
        assert!(approved);
        assert_eq!(cp.status, CheckpointStatus::Approved);
    }

    #[tokio::test]
    async fn test_scripted_reject() {
        let source = Arc::new(ScriptedDecisionSource::new([Some(Decision::Reject {
            reason: "scope too large".into(),
        })]));
        let gate = ApprovalGate::new(source.clone(), NonInteractivePolicy::Approve);
        let mut cp = checkpoint();
        assert!(!gate.request(&mut cp).await);
        assert_eq!(
            cp.status,
            CheckpointStatus::Rejected {
                reason: "scope too large".into()
            }
        );
        assert_eq!(source.asked(), vec!["implementation ready".to_string()]);
    }

    #[tokio::test]
    async fn test_no_signal_fails_open_by_default() {
        let gate = ApprovalGate::new(Arc::new(NoSignalSource), NonInteractivePolicy::default());
        let mut cp = checkpoint();
        assert!(gate.request(&mut cp).await);
    }

    #[tokio::test]
    async fn test_no_signal_can_fail_closed() {
        let gate = ApprovalGate::new(Arc::new(NoSignalSource), NonInteractivePolicy::Reject);
        let mut cp = checkpoint();
        assert!(!gate.request(&mut cp).await);
        assert!(cp.status.is_terminal());
    }

    #[tokio::test]
    async fn test_resolved_checkpoint_is_not_reasked() {
        let source = Arc::new(ScriptedDecisionSource::new([Some(Decision::Approve)]));
        let gate = ApprovalGate::new(source.clone(), NonInteractivePolicy::Reject);
        let mut cp = checkpoint();
        assert!(gate.request(&mut cp).await);
        assert!(gate.request(&mut cp).await);
        assert_eq!(source.asked().len(), 1);
    }

    #[test]
    fn test_answer_parsing() {
        assert_eq!(Decision::from_answer(" YES\n"), Decision::Approve);
        assert_eq!(Decision::from_answer("approve"), Decision::Approve);
        assert!(matches!(
            Decision::from_answer("no"),
            Decision::Reject { .. }
        ));
    }
}
