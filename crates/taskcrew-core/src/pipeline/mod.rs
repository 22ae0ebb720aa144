//! The phase pipeline and the records it produces.

pub mod decision;
mod orchestrator;
pub mod prompts;
mod result;
mod state;

pub use decision::{
    extract_artifacts, implementation_stats, parse_integration_info, parse_merge_decision,
    parse_quality_figures, parse_tests_passed, ImplementationStats, IntegrationInfo,
    MergeDecision, MergeVerdict, QualityFigures,
};
pub use orchestrator::{Collaborators, OrchestrationContext, Orchestrator};
pub use result::{
    IntegrationOutcome, PhaseResult, RunError, RunErrorKind, RunResult, TaskRequest,
};
pub use state::PipelineState;
