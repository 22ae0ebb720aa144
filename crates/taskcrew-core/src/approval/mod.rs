//! Approval gating for sensitive pipeline transitions.
//!
//! A checkpoint is created per gate invocation and resolved exactly once,
//! either by auto-approve, by an external [`DecisionSource`], or by the
//! configured [`NonInteractivePolicy`] when no signal is available.

pub mod checkpoint;
pub mod error;
pub mod gate;

pub use checkpoint::{ApprovalCheckpoint, CheckpointKind, CheckpointPayload, CheckpointStatus};
pub use error::{ApprovalError, ApprovalResult};
pub use gate::{
    ApprovalGate, Decision, DecisionSource, NoSignalSource, NonInteractivePolicy,
    ScriptedDecisionSource, StdinDecisionSource,
};
