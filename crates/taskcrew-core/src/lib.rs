//! Taskcrew Core Library
//!
//! Turns a natural-language request into a run of role-assigned phases.
//!
//! ## Key Components
//!
//! - [`classifier`]: request text to task type, roles and phases
//! - [`context`]: token budget, truncation and summarisation
//! - [`pipeline::Orchestrator`]: the phase state machine
//! - [`lifecycle::LifecycleManager`]: peer reviews, firing and replacement
//! - [`iteration::IterationController`]: bounded retries with feedback
//! - [`collaborators`]: executor, integration, notification and codebase seams

pub mod approval;
pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod fakes;
pub mod hurdles;
pub mod iteration;
pub mod lifecycle;
pub mod manifesto;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod roles;
pub mod telemetry;

pub use approval::{
    ApprovalCheckpoint, ApprovalGate, CheckpointKind, CheckpointStatus, Decision, DecisionSource,
    NonInteractivePolicy, StdinDecisionSource,
};
pub use classifier::{classify, TaskClassification, TaskType};
pub use config::{ConfigError, ConfigResult, OrchestratorConfig};
pub use context::{ContextBudget, ContextManager, ContextUsage, TruncationStrategy};
pub use hurdles::{Hurdle, HurdleLog, Severity};
pub use iteration::{IterationController, IterationOutcome};
pub use lifecycle::{LifecycleManager, RoleRecord, RoleStatus};
pub use pipeline::{
    Collaborators, OrchestrationContext, Orchestrator, PipelineState, RunError, RunErrorKind,
    RunResult, TaskRequest,
};
pub use roles::{Phase, Role};
