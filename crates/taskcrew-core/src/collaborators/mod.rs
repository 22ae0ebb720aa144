//! Interfaces to the services the orchestrator depends on, with the
//! implementations shipped in this crate.

pub mod codebase;
pub mod executor;
pub mod integration;
pub mod notify;

pub use codebase::{CodebaseInspector, CodebaseSummary, FsCodebaseInspector, NoCodebase};
pub use executor::{
    ExecutionError, ExecutionOutput, ExecutionResult, OpenAiExecutor, ReportedUsage,
    RoleExecutor, RoleInvocation,
};
pub use integration::{
    is_unresolved_feedback, Artifact, FeedbackItem, IntegrationCollaborator, IntegrationError,
    IntegrationRequest, IntegrationResult, LocalGitIntegration, MergeMethod, NoopIntegration,
};
pub use notify::{
    FanoutNotifier, LogNotifier, NoopNotifier, NotificationEvent, NotificationKind, Notifier,
    NotifyError, NotifyResult, WebhookNotifier,
};
