//! The phase pipeline: classify, walk the active phases, integrate.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn, Instrument};
use uuid::Uuid;

use taskcrew_state::fakes::NoopMetricsSink;
use taskcrew_state::{
    estimate_cost, AgentAction, Counter, MetricsSink, PhaseTiming, QualityScore, StorageResult,
    TokenUsage,
};

use super::decision::{
    extract_artifacts, implementation_stats, parse_integration_info, parse_merge_decision,
    parse_quality_figures, parse_tests_passed,
};
use super::prompts;
use super::result::{
    IntegrationOutcome, PhaseResult, RunError, RunErrorKind, RunResult, TaskRequest,
};
use super::state::PipelineState;
use crate::approval::{
    ApprovalCheckpoint, ApprovalGate, CheckpointKind, CheckpointPayload, CheckpointStatus,
};
use crate::classifier::TaskClassification;
use crate::collaborators::{
    CodebaseInspector, ExecutionError, ExecutionResult, FeedbackItem, IntegrationCollaborator,
    IntegrationError, NoCodebase, NoopIntegration, NoopNotifier, NotificationEvent,
    NotificationKind, Notifier, ReportedUsage, RoleExecutor, RoleInvocation,
};
use crate::config::{ConfigResult, OrchestratorConfig};
use crate::context::{ContextBudget, ContextManager, TruncationStrategy};
use crate::hurdles::{should_escalate, Hurdle, HurdleDetector};
use crate::lifecycle::{briefed_replacement, LifecycleEvent, LifecycleManager, RoleInstance};
use crate::metrics::METRICS;
use crate::obs;
use crate::roles::{Phase, Role};

/// Characters of the preceding role's output shown to its peer reviewer.
const REVIEW_EXCERPT_CHARS: usize = 1_000;
const PREVIEW_CHARS: usize = 500;
const CODEBASE_FILE_LIMIT: usize = 50;
/// Above this many comments only the most recent are shown to the integrator.
const COMMENT_WINDOW_TRIGGER: usize = 20;
const COMMENT_WINDOW: usize = 10;

/// Every external service the pipeline talks to. Absent services are
/// no-op implementations, so the pipeline calls them unconditionally.
#[derive(Clone)]
pub struct Collaborators {
    pub executor: Arc<dyn RoleExecutor>,
    pub integration: Arc<dyn IntegrationCollaborator>,
    pub notifier: Arc<dyn Notifier>,
    pub codebase: Arc<dyn CodebaseInspector>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl Collaborators {
    pub fn new(executor: Arc<dyn RoleExecutor>) -> Self {
        Self {
            executor,
            integration: Arc::new(NoopIntegration),
            notifier: Arc::new(NoopNotifier),
            codebase: Arc::new(NoCodebase),
            metrics: Arc::new(NoopMetricsSink),
        }
    }

    pub fn with_integration(mut self, integration: Arc<dyn IntegrationCollaborator>) -> Self {
        self.integration = integration;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_codebase(mut self, codebase: Arc<dyn CodebaseInspector>) -> Self {
        self.codebase = codebase;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Per-request state threaded through every phase: the role registry and
/// the context budget. Separate requests use separate contexts.
#[derive(Clone)]
pub struct OrchestrationContext {
    lifecycle: Arc<Mutex<LifecycleManager>>,
    context: ContextManager,
}

impl OrchestrationContext {
    pub fn new(lifecycle: LifecycleManager, context: ContextManager) -> Self {
        Self {
            lifecycle: Arc::new(Mutex::new(lifecycle)),
            context,
        }
    }

    pub fn lifecycle(&self) -> Arc<Mutex<LifecycleManager>> {
        Arc::clone(&self.lifecycle)
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    budget: ContextBudget,
    collaborators: Collaborators,
    gate: ApprovalGate,
    detector: HurdleDetector,
}

impl Orchestrator {
    /// Validates `config` before anything runs.
    pub fn new(
        config: OrchestratorConfig,
        collaborators: Collaborators,
        gate: ApprovalGate,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let budget = config.budget()?;
        Ok(Self {
            config,
            budget,
            collaborators,
            gate,
            detector: HurdleDetector::default(),
        })
    }

    pub fn with_detector(mut self, detector: HurdleDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Fresh context for a new request. Every role gets a replacement
    /// factory, so a fired role is succeeded immediately.
    pub fn new_context(&self) -> OrchestrationContext {
        let mut lifecycle = LifecycleManager::new().with_threshold(self.config.fire_threshold);
        for role in Role::ALL {
            lifecycle.set_factory(role, briefed_replacement());
        }
        OrchestrationContext::new(lifecycle, ContextManager::new(self.budget.clone()))
    }

    /// Execute one pass of the pipeline. Never fails: errors end the run in
    /// `Failed` with `RunResult::error` set and partial output preserved.
    pub async fn run(
        &self,
        ctx: &OrchestrationContext,
        request: &TaskRequest,
        iteration: u32,
    ) -> RunResult {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id);
        self.run_inner(ctx, request, iteration, run_id)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        ctx: &OrchestrationContext,
        request: &TaskRequest,
        iteration: u32,
        run_id: String,
    ) -> RunResult {
        let started = Instant::now();
        let classification = TaskClassification::from_text(&request.text, self.config.integrate);
        if classification.defaulted {
            debug!("no category matched, using the full-project default");
        }
        obs::emit_run_started(
            &run_id,
            &classification.task_type.to_string(),
            classification.required_phases.len(),
        );
        self.count(Counter::RequestsStarted).await;

        let mut run = RunResult::new(run_id, iteration, request.full_text(), classification);
        let (request_text, reduced) = ctx
            .context()
            .fit_request(&run.request, self.config.warn_threshold);
        if reduced {
            info!("request summarised to fit the context budget");
        }

        let codebase = if mentions_tests(&request.text) {
            self.collaborators
                .codebase
                .summarize()
                .await
                .map(|s| s.render(CODEBASE_FILE_LIMIT))
        } else {
            None
        };

        {
            let mut lifecycle = ctx.lifecycle.lock().await;
            for role in run.classification.required_roles.iter().copied() {
                lifecycle.register(role, RoleInstance::default_for(role));
            }
        }
        self.forward_lifecycle_events(ctx).await;

        let mut state = PipelineState::Classify.next();
        while let Some(phase) = state.phase() {
            if !run.classification.is_active(phase) {
                obs::emit_phase_skipped(&phase.to_string());
                state = state.next();
                continue;
            }
            let outcome = if phase == Phase::Integrate {
                self.integrate(ctx, &mut run, &request_text).await
            } else {
                self.execute_phase(ctx, &mut run, phase, &request_text, codebase.as_deref())
                    .await
            };
            state = match outcome {
                Ok(()) => state.next(),
                Err(error) => {
                    warn!(error = %error, "run stopped");
                    run.error = Some(error);
                    state.fail()
                }
            };
        }

        run.performance_report = ctx.lifecycle.lock().await.performance_report();
        run.final_state = state;
        run.duration_ms = elapsed_ms(started);
        let success = run.succeeded();
        self.count(if success {
            Counter::RequestsCompleted
        } else {
            Counter::RequestsFailed
        })
        .await;
        obs::emit_run_finished(&run.run_id, &state.to_string(), run.duration_ms, success);
        run
    }

    #[instrument(skip_all, fields(phase = %phase))]
    async fn execute_phase(
        &self,
        ctx: &OrchestrationContext,
        run: &mut RunResult,
        phase: Phase,
        request: &str,
        codebase: Option<&str>,
    ) -> Result<(), RunError> {
        let role = phase.role();
        let prompt = self.phase_prompt(ctx.context(), run, phase, request, codebase);
        let (persona, lineage_id) = self.persona(ctx, role).await;
        let started_at = Utc::now();
        let started = Instant::now();
        obs::emit_phase_started(&phase.to_string(), &role.to_string());

        let result = self
            .invoke(ctx.context(), &run.run_id, role, phase, persona, prompt)
            .await;
        METRICS.inc_phases_executed();
        let duration_ms = elapsed_ms(started);

        let text = match result {
            Ok(text) => text,
            Err(e) => {
                run.phase_results.push(PhaseResult {
                    phase,
                    role,
                    lineage_id,
                    output_text: String::new(),
                    succeeded: false,
                    hurdles: Vec::new(),
                    started_at,
                    duration_ms,
                });
                self.record_timing(&run.run_id, phase, role, started_at, duration_ms, false)
                    .await;
                obs::emit_phase_finished(
                    &phase.to_string(),
                    &role.to_string(),
                    false,
                    0,
                    duration_ms,
                );
                if is_optional(phase) {
                    warn!(error = %e, "optional phase failed, continuing");
                    return Ok(());
                }
                return Err(phase_error(phase, e));
            }
        };

        let hurdles = self.detector.detect(&text, &phase.to_string());
        let resolved = run.hurdles.resolve_addressed(phase, &text);
        if resolved > 0 {
            debug!(resolved, "earlier hurdles reported as handled");
        }
        run.hurdles.extend(phase, &hurdles);
        self.store_output(run, phase, &text).await;
        run.phase_results.push(PhaseResult {
            phase,
            role,
            lineage_id,
            output_text: text.clone(),
            succeeded: true,
            hurdles: hurdles.clone(),
            started_at,
            duration_ms,
        });
        self.record_timing(&run.run_id, phase, role, started_at, duration_ms, true)
            .await;
        obs::emit_phase_finished(
            &phase.to_string(),
            &role.to_string(),
            true,
            hurdles.len(),
            duration_ms,
        );

        self.notify_phase_complete(run, phase, &text).await;
        let escalated = self.escalate(phase, &hurdles).await;
        if matches!(phase, Phase::Plan | Phase::Build) || !escalated.is_empty() {
            let kind = CheckpointKind::for_phase(phase);
            let summary = if escalated.is_empty() {
                format!("{phase} phase complete")
            } else {
                format!(
                    "{phase} phase raised {} high-severity hurdle(s): {}",
                    escalated.len(),
                    escalated
                        .iter()
                        .map(|h| h.issue.as_str())
                        .collect::<Vec<_>>()
                        .join("; ")
                )
            };
            let payload = CheckpointPayload::new(summary)
                .with_details(json!({
                    "phase": phase,
                    "preview": preview(&text, PREVIEW_CHARS),
                }))
                .with_hurdles(escalated);
            self.request_approval(run, phase, kind, format!("{phase} output ready"), payload)
                .await?;
        }

        self.peer_review(ctx, run, phase).await;
        Ok(())
    }

    /// Log and announce HIGH/CRITICAL hurdles, returning them.
    async fn escalate(&self, phase: Phase, hurdles: &[Hurdle]) -> Vec<Hurdle> {
        let escalated: Vec<Hurdle> = hurdles
            .iter()
            .filter(|h| should_escalate(h))
            .cloned()
            .collect();
        for hurdle in &escalated {
            obs::emit_hurdle_escalated(
                &phase.to_string(),
                &hurdle.issue,
                &hurdle.severity.to_string(),
            );
            let message = format!(
                "{} ({})\n\nSuggested solutions:\n{}",
                hurdle.issue,
                hurdle.severity,
                hurdle.suggestions.join("\n")
            );
            self.notify(
                NotificationEvent::new(NotificationKind::TechnicalHurdle, message)
                    .with_data(json!({ "phase": phase, "hurdle": hurdle })),
            )
            .await;
        }
        escalated
    }

    async fn request_approval(
        &self,
        run: &mut RunResult,
        phase: Phase,
        kind: CheckpointKind,
        label: String,
        payload: CheckpointPayload,
    ) -> Result<(), RunError> {
        let mut checkpoint = ApprovalCheckpoint::new(kind, label, payload);
        if !self.gate.is_auto_approve() {
            self.notify(NotificationEvent::new(
                NotificationKind::ApprovalRequired,
                format!("{}: {}", checkpoint.label, checkpoint.payload.summary),
            ))
            .await;
        }
        let approved = self.gate.request(&mut checkpoint).await;
        let reason = match &checkpoint.status {
            CheckpointStatus::Rejected { reason } => reason.clone(),
            _ => String::new(),
        };
        run.checkpoints.push(checkpoint);
        if approved {
            Ok(())
        } else {
            Err(RunError::new(
                RunErrorKind::ApprovalRejected,
                Some(phase),
                format!("{kind} rejected: {reason}"),
            ))
        }
    }

    /// The current role rates the preceding active role's output.
    async fn peer_review(&self, ctx: &OrchestrationContext, run: &mut RunResult, phase: Phase) {
        let Some(previous) = preceding_phase(&run.classification, phase) else {
            return;
        };
        let (reviewer, reviewed) = (phase.role(), previous.role());
        // an executor failure says nothing about the role's work
        let Some(excerpt) = run
            .phase_result(previous)
            .filter(|r| r.succeeded)
            .map(|r| r.output_text.chars().take(REVIEW_EXCERPT_CHARS).collect::<String>())
        else {
            debug!(reviewer = %reviewer, reviewed = %reviewed, "peer review skipped, no output");
            return;
        };

        {
            let mut lifecycle = ctx.lifecycle.lock().await;
            let context = previous.to_string();
            match lifecycle.conduct_peer_review(reviewer, reviewed, &excerpt, &context) {
                Ok(review) => {
                    run.peer_reviews.push(review);
                    if let Err(e) = lifecycle.evaluate(reviewed) {
                        warn!(role = %reviewed, error = %e, "evaluation skipped");
                    }
                }
                Err(e) => debug!(error = %e, "peer review skipped"),
            }
        }
        self.forward_lifecycle_events(ctx).await;
    }

    async fn evaluate_all(&self, ctx: &OrchestrationContext, run: &RunResult) {
        {
            let mut lifecycle = ctx.lifecycle.lock().await;
            for role in run.classification.required_roles.iter().copied() {
                if lifecycle.instance(role).is_some() {
                    if let Err(e) = lifecycle.evaluate(role) {
                        warn!(role = %role, error = %e, "evaluation skipped");
                    }
                }
            }
        }
        self.forward_lifecycle_events(ctx).await;
    }

    async fn forward_lifecycle_events(&self, ctx: &OrchestrationContext) {
        let events = ctx.lifecycle.lock().await.drain_events();
        for event in events {
            let notification = match &event {
                LifecycleEvent::Fired { role, reason, .. } => NotificationEvent::new(
                    NotificationKind::RoleFired,
                    format!("{role} was fired: {reason}"),
                ),
                LifecycleEvent::Replaced { role, new_lineage, .. } => NotificationEvent::new(
                    NotificationKind::RoleReplaced,
                    format!("{role} replaced by {new_lineage}"),
                ),
                _ => continue,
            };
            let data = serde_json::to_value(&event).unwrap_or_default();
            self.notify(notification.with_data(data)).await;
        }
    }

    async fn persona(&self, ctx: &OrchestrationContext, role: Role) -> (String, Option<Uuid>) {
        let lifecycle = ctx.lifecycle.lock().await;
        match lifecycle.record(role).filter(|r| r.status.is_working()) {
            Some(record) => (record.instance.persona.clone(), Some(record.lineage_id)),
            None => (role.default_persona().to_string(), None),
        }
    }

    /// Call the executor and record tokens and the action. Blank output is
    /// an `EmptyResponse` failure.
    async fn invoke(
        &self,
        cm: &ContextManager,
        run_id: &str,
        role: Role,
        phase: Phase,
        persona: String,
        prompt: String,
    ) -> ExecutionResult<String> {
        let invocation = RoleInvocation {
            role,
            phase,
            persona,
            prompt,
        };
        let started = Instant::now();
        let result = self
            .collaborators
            .executor
            .execute(&invocation)
            .await
            .and_then(|output| {
                if output.text.trim().is_empty() {
                    Err(ExecutionError::EmptyResponse)
                } else {
                    Ok(output)
                }
            });
        let duration_ms = elapsed_ms(started);
        let metrics = &self.collaborators.metrics;

        match &result {
            Ok(output) => {
                let usage = output.usage.unwrap_or_else(|| ReportedUsage {
                    input_tokens: (cm.count(&invocation.persona) + cm.count(&invocation.prompt))
                        as u64,
                    output_tokens: cm.count(&output.text) as u64,
                });
                let model = self.collaborators.executor.model();
                let record = TokenUsage {
                    run_id: run_id.to_string(),
                    timestamp: Utc::now(),
                    role: role.to_string(),
                    phase: phase.to_string(),
                    model: model.to_string(),
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    estimated_cost: estimate_cost(model, usage.input_tokens, usage.output_tokens),
                };
                sink_result(metrics.record_tokens(record).await);
                sink_result(
                    metrics
                        .record_action(AgentAction::new(
                            run_id,
                            role.to_string(),
                            "execute",
                            phase.to_string(),
                            duration_ms,
                        ))
                        .await,
                );
            }
            Err(e) => {
                sink_result(
                    metrics
                        .record_action(AgentAction::new(
                            run_id,
                            role.to_string(),
                            "execute_failed",
                            format!("{phase}: {e}"),
                            duration_ms,
                        ))
                        .await,
                );
            }
        }
        result.map(|o| o.text)
    }

    fn phase_prompt(
        &self,
        cm: &ContextManager,
        run: &RunResult,
        phase: Phase,
        request: &str,
        codebase: Option<&str>,
    ) -> String {
        let max_in = cm.budget().max_input_tokens();
        let codebase =
            codebase.map(|c| cm.truncate_to_fit(c, max_in / 4, TruncationStrategy::Tail));
        let codebase = codebase.as_deref();
        let plan = run
            .plan
            .as_deref()
            .map(|p| cm.summarize_for_context(p, Some(max_in / 4)));
        let subject = run.implementation.as_deref().unwrap_or(request);

        match phase {
            Phase::Plan => prompts::plan(
                &cm.truncate_to_fit(request, max_in / 2, TruncationStrategy::Tail),
                codebase,
            ),
            Phase::Build => {
                let plan = run
                    .plan
                    .as_deref()
                    .map(|p| cm.summarize_for_context(p, Some(max_in / 3)));
                prompts::build(
                    &cm.truncate_to_fit(request, max_in / 4, TruncationStrategy::Tail),
                    plan.as_deref(),
                    codebase,
                )
            }
            Phase::Review => prompts::review(
                plan.as_deref(),
                &cm.summarize_for_context(subject, Some(max_in / 2)),
            ),
            Phase::Test => prompts::test(
                &cm.summarize_for_context(subject, Some(max_in / 2)),
                plan.as_deref(),
                codebase,
            ),
            Phase::Integrate => {
                let share = max_in / 4;
                let review = run
                    .review
                    .as_deref()
                    .map(|r| cm.summarize_for_context(r, Some(share)));
                let tests = run
                    .test_results
                    .as_deref()
                    .map(|t| cm.summarize_for_context(t, Some(share)));
                prompts::integration_info(
                    review.as_deref(),
                    tests.as_deref(),
                    &self.branch_name(&run.request),
                )
            }
        }
    }

    async fn store_output(&self, run: &mut RunResult, phase: Phase, text: &str) {
        match phase {
            Phase::Plan => run.plan = Some(text.to_string()),
            Phase::Build => run.implementation = Some(text.to_string()),
            Phase::Review => {
                run.review = Some(text.to_string());
                if let Some(figures) = parse_quality_figures(text) {
                    let score = QualityScore {
                        run_id: run.run_id.clone(),
                        timestamp: Utc::now(),
                        role: Role::Reviewer.to_string(),
                        dry_violations: figures.dry_violations,
                        complexity: figures.complexity,
                        readability: figures.readability,
                        maintainability: figures.maintainability,
                    };
                    sink_result(self.collaborators.metrics.record_quality(score).await);
                }
            }
            Phase::Test => {
                run.test_results = Some(text.to_string());
                run.tests_passed = Some(parse_tests_passed(text));
            }
            Phase::Integrate => {}
        }
    }

    async fn notify_phase_complete(&self, run: &RunResult, phase: Phase, text: &str) {
        let event = match phase {
            Phase::Plan => NotificationEvent::new(
                NotificationKind::PlanComplete,
                format!(
                    "Development plan has been created.\n\nPreview:\n{}",
                    preview(text, PREVIEW_CHARS)
                ),
            ),
            Phase::Build => {
                let stats = implementation_stats(text);
                NotificationEvent::new(
                    NotificationKind::ImplementationComplete,
                    format!("Files: {}\nLines: {}", stats.file_count, stats.loc),
                )
                .with_data(json!(stats))
            }
            Phase::Test if run.tests_passed == Some(false) => NotificationEvent::new(
                NotificationKind::TestingFailed,
                format!("Failures:\n{}", preview(text, PREVIEW_CHARS)),
            ),
            Phase::Test => NotificationEvent::new(
                NotificationKind::TestingPassed,
                format!("Test results:\n{}", preview(text, PREVIEW_CHARS)),
            ),
            Phase::Review | Phase::Integrate => return,
        };
        self.notify(event).await;
    }

    #[instrument(skip_all)]
    async fn integrate(
        &self,
        ctx: &OrchestrationContext,
        run: &mut RunResult,
        request: &str,
    ) -> Result<(), RunError> {
        let phase = Phase::Integrate;
        let role = Role::Integrator;
        let (_, lineage_id) = self.persona(ctx, role).await;
        let started_at = Utc::now();
        let started = Instant::now();
        obs::emit_phase_started(&phase.to_string(), &role.to_string());

        let mut outcome = IntegrationOutcome::new(self.branch_name(&run.request));
        let result = self.integrate_steps(ctx, run, request, &mut outcome).await;
        METRICS.inc_phases_executed();
        let duration_ms = elapsed_ms(started);

        if let Err(e) = &result {
            if e.kind == RunErrorKind::Integration {
                outcome.error = Some(e.message.clone());
            }
        }
        let text = outcome.decision_text.clone().unwrap_or_default();
        let hurdles = if text.trim().is_empty() {
            Vec::new()
        } else {
            self.detector.detect(&text, &phase.to_string())
        };
        run.hurdles.resolve_addressed(phase, &text);
        run.hurdles.extend(phase, &hurdles);
        let succeeded = result.is_ok();
        run.phase_results.push(PhaseResult {
            phase,
            role,
            lineage_id,
            output_text: text,
            succeeded,
            hurdles: hurdles.clone(),
            started_at,
            duration_ms,
        });
        run.integration = Some(outcome);
        self.record_timing(&run.run_id, phase, role, started_at, duration_ms, succeeded)
            .await;
        obs::emit_phase_finished(
            &phase.to_string(),
            &role.to_string(),
            succeeded,
            hurdles.len(),
            duration_ms,
        );

        if succeeded {
            self.peer_review(ctx, run, phase).await;
            self.evaluate_all(ctx, run).await;
        }
        result
    }

    async fn integrate_steps(
        &self,
        ctx: &OrchestrationContext,
        run: &mut RunResult,
        request: &str,
        outcome: &mut IntegrationOutcome,
    ) -> Result<(), RunError> {
        let phase = Phase::Integrate;
        let cm = ctx.context();
        let base = self.config.base_branch.clone();
        let integration = Arc::clone(&self.collaborators.integration);

        let stats = run
            .implementation
            .as_deref()
            .map(implementation_stats)
            .unwrap_or_default();
        let payload = CheckpointPayload::new(format!(
            "Open an integration request from {} into {base}",
            outcome.branch
        ))
        .with_details(json!({
            "branch": outcome.branch,
            "files": stats.file_count,
            "tests_passed": run.tests_passed,
        }));
        self.request_approval(
            run,
            phase,
            CheckpointKind::PreIntegration,
            "integration request ready".to_string(),
            payload,
        )
        .await?;

        let (persona, _) = self.persona(ctx, Role::Integrator).await;
        let draft_prompt = self.phase_prompt(cm, run, phase, request, None);
        let draft = self
            .invoke(cm, &run.run_id, Role::Integrator, phase, persona.clone(), draft_prompt)
            .await
            .map_err(|e| phase_error(phase, e))?;
        let info = parse_integration_info(&draft);

        match integration.create_branch(&outcome.branch, &base).await {
            Ok(()) => {}
            Err(IntegrationError::BranchExists(name)) => {
                info!(branch = %name, "branch already exists, reusing it");
            }
            Err(e) => return Err(integration_error(e)),
        }

        let mut artifacts = run
            .implementation
            .as_deref()
            .map(extract_artifacts)
            .unwrap_or_default();
        artifacts.extend(run.test_results.as_deref().map(extract_artifacts).unwrap_or_default());
        outcome.files_committed = integration
            .commit_files(&outcome.branch, &artifacts, &info.title)
            .await
            .map_err(integration_error)?;

        let opened = integration
            .open_integration_request(&outcome.branch, &base, &info.title, &info.body)
            .await
            .map_err(integration_error)?;
        outcome.request = Some(opened.clone());
        self.notify(
            NotificationEvent::new(
                NotificationKind::IntegrationOpened,
                format!("URL: {}\nNumber: {}", opened.url, opened.number),
            )
            .with_data(json!(opened)),
        )
        .await;

        let max_in = cm.budget().max_input_tokens();
        let reviewers: Vec<Role> = run
            .classification
            .required_roles
            .iter()
            .copied()
            .filter(|r| *r != Role::Integrator)
            .collect();
        for reviewer in reviewers {
            let excerpt = run
                .output(reviewer.phase())
                .map(|t| cm.truncate_to_fit(t, max_in / 4, TruncationStrategy::Tail))
                .unwrap_or_default();
            let (persona, _) = self.persona(ctx, reviewer).await;
            let prompt = prompts::integration_review(reviewer, &opened, &excerpt);
            match self
                .invoke(cm, &run.run_id, reviewer, phase, persona, prompt)
                .await
            {
                Ok(body) => {
                    integration
                        .post_comment(opened.number, &reviewer.to_string(), &body)
                        .await
                        .map_err(integration_error)?;
                    outcome
                        .reviews_posted
                        .push(FeedbackItem::new(reviewer.to_string(), body));
                }
                Err(e) => warn!(role = %reviewer, error = %e, "no review comment produced"),
            }
        }

        outcome.unresolved_feedback = integration
            .list_unresolved_feedback(opened.number)
            .await
            .map_err(integration_error)?;
        outcome.has_unresolved_feedback = !outcome.unresolved_feedback.is_empty()
            || outcome.reviews_posted.iter().any(FeedbackItem::is_unresolved);

        let window = recent_comments(&outcome.reviews_posted);
        let share = max_in / (2 * window.len().max(1));
        let budgeted: Vec<FeedbackItem> = window
            .iter()
            .map(|c| {
                FeedbackItem::new(
                    c.author.clone(),
                    cm.truncate_to_fit(&c.body, share, TruncationStrategy::Tail),
                )
            })
            .collect();
        let decision_text = self
            .invoke(
                cm,
                &run.run_id,
                Role::Integrator,
                phase,
                persona,
                prompts::merge_decision(&opened, &budgeted),
            )
            .await
            .map_err(|e| phase_error(phase, e))?;
        let decision = parse_merge_decision(&decision_text);
        outcome.decision_text = Some(decision_text.clone());
        outcome.decision = Some(decision.clone());

        if decision.is_approved() && !outcome.has_unresolved_feedback {
            let message = decision
                .commit_message
                .clone()
                .unwrap_or_else(|| info.title.clone());
            integration
                .merge(opened.number, decision.method, &message)
                .await
                .map_err(integration_error)?;
            outcome.merged = true;
            self.notify(NotificationEvent::new(
                NotificationKind::IntegrationMerged,
                format!("Integration request #{} merged", opened.number),
            ))
            .await;
        } else {
            outcome.deferred = true;
            if decision.is_approved() {
                info!("merge withheld: unresolved feedback present");
            }
            if let Err(e) = integration
                .post_comment(
                    opened.number,
                    &Role::Integrator.to_string(),
                    &prompts::decision_comment(&decision_text),
                )
                .await
            {
                obs::emit_collaborator_error("integration", &e);
            }
        }
        Ok(())
    }

    /// Configured branch, or `feature/project-<first 8 hex of sha256(request)>`.
    pub fn branch_name(&self, request: &str) -> String {
        self.config.branch_name.clone().unwrap_or_else(|| {
            let digest = hex::encode(Sha256::digest(request.as_bytes()));
            format!("feature/project-{}", &digest[..8])
        })
    }

    async fn record_timing(
        &self,
        run_id: &str,
        phase: Phase,
        role: Role,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        succeeded: bool,
    ) {
        let timing = PhaseTiming {
            run_id: run_id.to_string(),
            phase: phase.to_string(),
            roles: vec![role.to_string()],
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            succeeded,
        };
        sink_result(self.collaborators.metrics.record_phase(timing).await);
    }

    async fn count(&self, counter: Counter) {
        sink_result(self.collaborators.metrics.increment(counter, 1).await);
    }

    async fn notify(&self, event: NotificationEvent) {
        if let Err(e) = self.collaborators.notifier.send(&event).await {
            obs::emit_collaborator_error("notifier", &e);
        }
    }
}

/// Review and Test failures are recorded but do not stop the run.
fn is_optional(phase: Phase) -> bool {
    matches!(phase, Phase::Review | Phase::Test)
}

fn preceding_phase(classification: &TaskClassification, phase: Phase) -> Option<Phase> {
    let idx = classification
        .required_phases
        .iter()
        .position(|p| *p == phase)?;
    idx.checked_sub(1)
        .and_then(|i| classification.required_phases.get(i))
        .copied()
}

fn recent_comments(items: &[FeedbackItem]) -> &[FeedbackItem] {
    if items.len() > COMMENT_WINDOW_TRIGGER {
        &items[items.len() - COMMENT_WINDOW..]
    } else {
        items
    }
}

fn mentions_tests(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("test") || lowered.contains("coverage")
}

fn preview(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn phase_error(phase: Phase, e: ExecutionError) -> RunError {
    RunError::new(RunErrorKind::PhaseExecution, Some(phase), e.to_string())
}

fn integration_error(e: IntegrationError) -> RunError {
    RunError::new(RunErrorKind::Integration, Some(Phase::Integrate), e.to_string())
}

fn sink_result(result: StorageResult<()>) {
    if let Err(e) = result {
        obs::emit_collaborator_error("metrics", &e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preceding_phase_skips_inactive() {
        let poc = TaskClassification::from_text("Build a quick POC for a CLI calculator", true);
        assert_eq!(preceding_phase(&poc, Phase::Build), None);
        assert_eq!(preceding_phase(&poc, Phase::Integrate), Some(Phase::Build));
    }

    #[test]
    fn test_recent_comments_window() {
        let items: Vec<FeedbackItem> = (0..25)
            .map(|i| FeedbackItem::new("a", i.to_string()))
            .collect();
        let window = recent_comments(&items);
        assert_eq!(window.len(), 10);
        assert_eq!(window[0].body, "15");
        assert_eq!(recent_comments(&items[..20]).len(), 20);
    }

    #[test]
    fn test_mentions_tests() {
        assert!(mentions_tests("Raise Coverage to 80%"));
        assert!(!mentions_tests("Build a calculator"));
    }
}
