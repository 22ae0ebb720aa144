use std::sync::Arc;

use async_trait::async_trait;
use taskcrew_core::approval::{ScriptedDecisionSource, NonInteractivePolicy};
use taskcrew_core::collaborators::{
    CodebaseInspector, CodebaseSummary, ExecutionError, NotificationKind,
};
use taskcrew_core::fakes::{RecordingNotifier, ScriptedExecutor};
use taskcrew_core::hurdles::HurdleDetector;
use taskcrew_core::lifecycle::RoleStatus;
use taskcrew_core::{
    ApprovalGate, CheckpointKind, CheckpointStatus, Collaborators, Decision, Orchestrator,
    OrchestratorConfig, Phase, PipelineState, Role, RunErrorKind, RunResult, Severity,
    TaskRequest,
};
use taskcrew_state::fakes::MemoryMetricsSink;
use taskcrew_state::{Counter, MetricsSink};

const FULL_PROJECT: &str = "Create a todo application with a web UI";
const POC: &str = "Build a quick POC for a CLI calculator";

struct Harness {
    executor: Arc<ScriptedExecutor>,
    notifier: Arc<RecordingNotifier>,
    metrics: Arc<MemoryMetricsSink>,
    orchestrator: Orchestrator,
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        model_tag: "test-model".to_string(),
        ..Default::default()
    }
}

fn harness(executor: ScriptedExecutor, gate: ApprovalGate) -> Harness {
    let executor = Arc::new(executor);
    let notifier = Arc::new(RecordingNotifier::new());
    let metrics = Arc::new(MemoryMetricsSink::new());
    let collaborators = Collaborators::new(executor.clone())
        .with_notifier(notifier.clone())
        .with_metrics(metrics.clone());
    let orchestrator = Orchestrator::new(config(), collaborators, gate).unwrap();
    Harness {
        executor,
        notifier,
        metrics,
        orchestrator,
    }
}

async fn run(h: &Harness, request: &str) -> RunResult {
    let ctx = h.orchestrator.new_context();
    h.orchestrator.run(&ctx, &TaskRequest::new(request), 1).await
}

#[tokio::test]
async fn full_project_runs_every_phase_in_order() {
    let h = harness(ScriptedExecutor::new(), ApprovalGate::auto_approve());
    let result = run(&h, FULL_PROJECT).await;

    assert_eq!(result.final_state, PipelineState::Done);
    assert!(result.succeeded());
    assert!(result.error.is_none());
    assert_eq!(
        h.executor.phases_called(),
        vec![Phase::Plan, Phase::Build, Phase::Review, Phase::Test]
    );
    assert_eq!(result.skipped_phases, vec![Phase::Integrate]);
    assert!(result.plan.is_some());
    assert!(result.implementation.is_some());
    assert!(result.review.is_some());
    assert_eq!(result.tests_passed, Some(true));

    let kinds: Vec<CheckpointKind> = result.checkpoints.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![CheckpointKind::Plan, CheckpointKind::Implementation]);
    assert!(result
        .checkpoints
        .iter()
        .all(|c| c.status == CheckpointStatus::Approved));

    let reviews: Vec<(Role, Role)> = result
        .peer_reviews
        .iter()
        .map(|r| (r.reviewer_role, r.reviewed_role))
        .collect();
    assert_eq!(
        reviews,
        vec![
            (Role::Builder, Role::Planner),
            (Role::Reviewer, Role::Builder),
            (Role::Tester, Role::Reviewer),
        ]
    );
    assert_eq!(result.performance_report.len(), 4);

    let kinds = h.notifier.kinds();
    assert!(kinds.contains(&NotificationKind::PlanComplete));
    assert!(kinds.contains(&NotificationKind::ImplementationComplete));
    assert!(kinds.contains(&NotificationKind::TestingPassed));
    assert!(!kinds.contains(&NotificationKind::ApprovalRequired));
}

#[tokio::test]
async fn metrics_are_recorded_per_phase() {
    let h = harness(ScriptedExecutor::new().with_model("gpt-4"), ApprovalGate::auto_approve());
    let result = run(&h, FULL_PROJECT).await;

    assert_eq!(h.metrics.phases().len(), 4);
    assert!(h.metrics.phases().iter().all(|p| p.succeeded));
    let usage = h.metrics.token_usage(&result.run_id).await.unwrap();
    assert_eq!(usage.len(), 4);
    assert!(usage.iter().all(|u| u.input_tokens > 0 && u.estimated_cost > 0.0));
    assert_eq!(
        h.metrics
            .actions()
            .iter()
            .filter(|a| a.action_type == "execute")
            .count(),
        4
    );

    let quality = h.metrics.quality_scores();
    assert_eq!(quality.len(), 1);
    assert_eq!(quality[0].readability, Some(9.0));
    assert_eq!(quality[0].dry_violations, Some(0));

    assert_eq!(h.metrics.counter(Counter::RequestsStarted).await.unwrap(), 1);
    assert_eq!(h.metrics.counter(Counter::RequestsCompleted).await.unwrap(), 1);
    assert_eq!(h.metrics.counter(Counter::RequestsFailed).await.unwrap(), 0);
}

#[tokio::test]
async fn rejected_plan_returns_partial_result() {
    let source = Arc::new(ScriptedDecisionSource::new([Some(Decision::Reject {
        reason: "scope too broad".into(),
    })]));
    let gate = ApprovalGate::new(source.clone(), NonInteractivePolicy::Approve);
    let h = harness(ScriptedExecutor::new(), gate);
    let result = run(&h, FULL_PROJECT).await;

    assert_eq!(result.final_state, PipelineState::Failed);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.kind, RunErrorKind::ApprovalRejected);
    assert_eq!(error.phase, Some(Phase::Plan));
    assert!(error.message.contains("scope too broad"));

    assert!(result.plan.is_some());
    assert!(result.implementation.is_none());
    assert_eq!(h.executor.phases_called(), vec![Phase::Plan]);
    assert_eq!(result.phase_results.len(), 1);
    assert!(result.phase_results[0].succeeded);
    assert!(result.peer_reviews.is_empty());
    assert_eq!(source.asked().len(), 1);
    assert!(h.notifier.kinds().contains(&NotificationKind::ApprovalRequired));
    assert_eq!(h.metrics.counter(Counter::RequestsFailed).await.unwrap(), 1);
}

#[tokio::test]
async fn no_approval_signal_fails_open_by_default() {
    let gate = ApprovalGate::new(
        Arc::new(ScriptedDecisionSource::new(Vec::<Option<Decision>>::new())),
        NonInteractivePolicy::default(),
    );
    let h = harness(ScriptedExecutor::new(), gate);
    let result = run(&h, POC).await;
    assert_eq!(result.final_state, PipelineState::Done);
    assert_eq!(result.checkpoints.len(), 1);
    assert!(result.checkpoints[0].status.allows_proceed());
}

#[tokio::test]
async fn executor_error_in_build_fails_the_run() {
    let exec =
        ScriptedExecutor::new().fail(Role::Builder, Phase::Build, || ExecutionError::Timeout);
    let h = harness(exec, ApprovalGate::auto_approve());
    let result = run(&h, POC).await;

    assert_eq!(result.final_state, PipelineState::Failed);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.kind, RunErrorKind::PhaseExecution);
    assert_eq!(error.phase, Some(Phase::Build));

    let build = result.phase_result(Phase::Build).unwrap();
    assert!(!build.succeeded);
    assert!(build.output_text.is_empty());
    assert!(result.checkpoints.is_empty());
    assert!(h
        .metrics
        .actions()
        .iter()
        .any(|a| a.action_type == "execute_failed"));
    assert!(!h.metrics.phases()[0].succeeded);
}

#[tokio::test]
async fn empty_response_is_a_phase_failure() {
    let exec = ScriptedExecutor::new().reply(Role::Planner, Phase::Plan, "  \n ");
    let h = harness(exec, ApprovalGate::auto_approve());
    let result = run(&h, FULL_PROJECT).await;
    assert_eq!(result.final_state, PipelineState::Failed);
    assert!(result
        .error
        .as_ref()
        .unwrap()
        .message
        .contains("empty response"));
}

#[tokio::test]
async fn optional_review_failure_continues_without_judging_the_reviewer() {
    let exec =
        ScriptedExecutor::new().fail(Role::Reviewer, Phase::Review, || ExecutionError::RateLimited);
    let h = harness(exec, ApprovalGate::auto_approve());
    let result = run(&h, FULL_PROJECT).await;

    assert_eq!(result.final_state, PipelineState::Done);
    assert!(result.review.is_none());
    assert!(!result.phase_result(Phase::Review).unwrap().succeeded);
    assert!(result.test_results.is_some());

    // the tester has nothing of the reviewer's to rate
    let reviews: Vec<(Role, Role)> = result
        .peer_reviews
        .iter()
        .map(|r| (r.reviewer_role, r.reviewed_role))
        .collect();
    assert_eq!(
        reviews,
        vec![(Role::Builder, Role::Planner), (Role::Reviewer, Role::Builder)]
    );
    let reviewer_records: Vec<RoleStatus> = result
        .performance_report
        .iter()
        .filter(|s| s.role == Role::Reviewer)
        .map(|s| s.status)
        .collect();
    assert_eq!(reviewer_records, vec![RoleStatus::Active]);
    let kinds = h.notifier.kinds();
    assert!(!kinds.contains(&NotificationKind::RoleFired));
}

#[tokio::test]
async fn builder_output_with_ordinary_error_handling_keeps_the_builder() {
    let build = "Implementation complete. Division returns an error on failure.\n\n\
                 ```rust:src/lib.rs\n\
                 #[derive(Debug, thiserror::Error)]\n\
                 pub enum CalcError {\n    #[error(\"division by zero\")]\n    DivByZero,\n}\n\n\
                 pub fn div(a: i64, b: i64) -> Result<i64, CalcError> {\n\
                 \x20   if b == 0 { return Err(CalcError::DivByZero); }\n    Ok(a / b)\n}\n```\n";
    let exec = ScriptedExecutor::new()
        .reply(Role::Builder, Phase::Build, build)
        .reply(Role::Builder, Phase::Build, build);
    let h = harness(exec, ApprovalGate::auto_approve());
    let ctx = h.orchestrator.new_context();
    for iteration in 1..=2 {
        let result = h
            .orchestrator
            .run(&ctx, &TaskRequest::new(FULL_PROJECT), iteration)
            .await;
        assert_eq!(result.final_state, PipelineState::Done);
    }

    let lifecycle = ctx.lifecycle();
    let lifecycle = lifecycle.lock().await;
    let builders: Vec<RoleStatus> = lifecycle
        .records()
        .iter()
        .filter(|r| r.role_name == Role::Builder)
        .map(|r| r.status)
        .collect();
    assert_eq!(builders, vec![RoleStatus::Active]);
    assert!(lifecycle
        .record(Role::Builder)
        .unwrap()
        .peer_reviews
        .iter()
        .all(|r| r.rating >= 4));
}

#[tokio::test]
async fn critical_hurdle_raises_gate_and_stays_open_until_addressed() {
    let review = "Issue: SQL injection in login handler\nSeverity: critical\nSuggestion: use parameterized queries";
    let exec = ScriptedExecutor::new().reply(Role::Reviewer, Phase::Review, review);
    let h = harness(exec, ApprovalGate::auto_approve());
    let result = run(&h, FULL_PROJECT).await;

    assert_eq!(result.checkpoints.len(), 3);
    let gate = &result.checkpoints[2];
    assert_eq!(gate.kind, CheckpointKind::Implementation);
    assert_eq!(gate.payload.hurdles.len(), 1);
    assert_eq!(gate.payload.hurdles[0].severity, Severity::Critical);
    assert!(h.notifier.kinds().contains(&NotificationKind::TechnicalHurdle));
    assert_eq!(result.hurdles.unresolved_critical().len(), 1);
    assert!(!taskcrew_core::iteration::is_complete(&result));

    let exec = ScriptedExecutor::new()
        .reply(Role::Reviewer, Phase::Review, review)
        .reply(
            Role::Tester,
            Phase::Test,
            "All tests passed.\nSQL injection in login handler fixed with bound parameters.",
        );
    let h = harness(exec, ApprovalGate::auto_approve());
    let result = run(&h, FULL_PROJECT).await;
    assert!(result.hurdles.unresolved_critical().is_empty());
    assert!(taskcrew_core::iteration::is_complete(&result));
    // the phase snapshot keeps the hurdle as first reported
    assert!(!result.phase_result(Phase::Review).unwrap().hurdles[0].resolved);
}

#[tokio::test]
async fn custom_detector_markers_raise_gates() {
    let review = "Blocker: credentials are hard-coded in config.rs\nSeverity: critical";
    let exec = ScriptedExecutor::new().reply(Role::Reviewer, Phase::Review, review);
    let h = harness(exec, ApprovalGate::auto_approve());
    let orchestrator = h
        .orchestrator
        .with_detector(HurdleDetector::default().with_issue_marker("blocker:"));
    let ctx = orchestrator.new_context();
    let result = orchestrator
        .run(&ctx, &TaskRequest::new(FULL_PROJECT), 1)
        .await;

    assert_eq!(result.checkpoints.len(), 3);
    let hurdles = &result.checkpoints[2].payload.hurdles;
    assert_eq!(hurdles.len(), 1);
    assert_eq!(hurdles[0].issue, "credentials are hard-coded in config.rs");
    assert_eq!(hurdles[0].severity, Severity::Critical);
}

#[tokio::test]
async fn inactive_phases_are_skipped_not_failed() {
    let h = harness(ScriptedExecutor::new(), ApprovalGate::auto_approve());
    let result = run(&h, POC).await;

    assert_eq!(result.final_state, PipelineState::Done);
    assert_eq!(h.executor.phases_called(), vec![Phase::Build]);
    assert_eq!(
        result.skipped_phases,
        vec![Phase::Plan, Phase::Review, Phase::Test, Phase::Integrate]
    );
    assert_eq!(result.phase_results.len(), 1);
    assert!(result.peer_reviews.is_empty());
    assert_eq!(result.tests_passed, None);
}

#[tokio::test]
async fn failing_tests_are_reported() {
    let exec = ScriptedExecutor::new().reply(
        Role::Tester,
        Phase::Test,
        "FAILED: test_divide_by_zero\n1 tests failed",
    );
    let h = harness(exec, ApprovalGate::auto_approve());
    let result = run(&h, FULL_PROJECT).await;
    assert_eq!(result.tests_passed, Some(false));
    assert!(!result.build_succeeded());
    assert!(h.notifier.kinds().contains(&NotificationKind::TestingFailed));
}

struct StubCodebase;

#[async_trait]
impl CodebaseInspector for StubCodebase {
    async fn summarize(&self) -> Option<CodebaseSummary> {
        Some(CodebaseSummary {
            file_count: 3,
            files_needing_tests: vec!["src/payments.rs".into()],
            existing_test_pattern: Some("cargo test".into()),
        })
    }
}

#[tokio::test]
async fn codebase_summary_reaches_test_requests() {
    let executor = Arc::new(ScriptedExecutor::new());
    let collaborators = Collaborators::new(executor.clone()).with_codebase(Arc::new(StubCodebase));
    let orchestrator =
        Orchestrator::new(config(), collaborators, ApprovalGate::auto_approve()).unwrap();
    let ctx = orchestrator.new_context();
    let request = TaskRequest::new(
        "Add unit tests to the existing payments module, target 80% coverage",
    );
    let result = orchestrator.run(&ctx, &request, 1).await;

    assert_eq!(result.final_state, PipelineState::Done);
    let build = executor
        .calls()
        .into_iter()
        .find(|c| c.phase == Phase::Build)
        .unwrap();
    assert!(build.prompt.contains("src/payments.rs"));
    assert!(build.prompt.contains("cargo test"));
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
    let config = OrchestratorConfig {
        max_iterations: 0,
        ..config()
    };
    let collaborators = Collaborators::new(Arc::new(ScriptedExecutor::new()));
    assert!(Orchestrator::new(config, collaborators, ApprovalGate::auto_approve()).is_err());
}
