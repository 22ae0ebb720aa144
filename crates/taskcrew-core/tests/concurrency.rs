use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use taskcrew_core::collaborators::{ExecutionOutput, ExecutionResult, RoleExecutor, RoleInvocation};
use taskcrew_core::{
    ApprovalGate, Collaborators, Orchestrator, OrchestratorConfig, Phase, PipelineState,
    RunResult, TaskRequest,
};

const ALPHA: &str = "Create a todo application with a web UI for team ALPHA";
const BETA: &str = "Create a todo application with a web UI for team BETA";
const BUILD: &str = "Implementation complete.\n\n```rust:src/lib.rs\npub fn add(a: i64, b: i64) -> i64 {\n    a + b\n}\n```\n";

/// Replies depend only on the prompt, so both runs can share one executor.
struct TeamExecutor;

#[async_trait]
impl RoleExecutor for TeamExecutor {
    fn model(&self) -> &str {
        "test-model"
    }

    async fn execute(&self, invocation: &RoleInvocation) -> ExecutionResult<ExecutionOutput> {
        tokio::task::yield_now().await;
        let team = if invocation.prompt.contains("ALPHA") {
            "alpha"
        } else {
            "beta"
        };
        let text = match invocation.phase {
            Phase::Plan => format!(
                "## Plan\nIssue: {team} storage choice is open\nSeverity: low\nSuggestion: start with sqlite"
            ),
            Phase::Build => BUILD.to_string(),
            Phase::Review => "Readability: 8\nMaintainability: 8".to_string(),
            Phase::Test => "All tests passed.".to_string(),
            Phase::Integrate => "Title: Add todo app".to_string(),
        };
        Ok(ExecutionOutput::text(text))
    }
}

fn issues(result: &RunResult) -> Vec<String> {
    result
        .hurdles
        .entries
        .iter()
        .map(|e| e.hurdle.issue.clone())
        .collect()
}

#[tokio::test]
async fn concurrent_requests_keep_separate_state() {
    let config = OrchestratorConfig {
        model_tag: "test-model".to_string(),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(
        config,
        Collaborators::new(Arc::new(TeamExecutor)),
        ApprovalGate::auto_approve(),
    )
    .unwrap();
    let (ctx_a, ctx_b) = (orchestrator.new_context(), orchestrator.new_context());
    let (alpha, beta) = (TaskRequest::new(ALPHA), TaskRequest::new(BETA));

    let (a, b) = tokio::join!(
        orchestrator.run(&ctx_a, &alpha, 1),
        orchestrator.run(&ctx_b, &beta, 1),
    );
    assert_eq!(a.final_state, PipelineState::Done);
    assert_eq!(b.final_state, PipelineState::Done);
    assert_ne!(a.run_id, b.run_id);

    let a_issues = issues(&a);
    let b_issues = issues(&b);
    assert!(a_issues.iter().any(|i| i.contains("alpha storage")));
    assert!(!a_issues.iter().any(|i| i.contains("beta")));
    assert!(b_issues.iter().any(|i| i.contains("beta storage")));
    assert!(!b_issues.iter().any(|i| i.contains("alpha")));

    let lifecycle_a = ctx_a.lifecycle();
    let lifecycle_b = ctx_b.lifecycle();
    let (records_a, records_b) = (lifecycle_a.lock().await, lifecycle_b.lock().await);
    assert_eq!(records_a.records().len(), 4);
    assert_eq!(records_b.records().len(), 4);
    let lineages_a: HashSet<_> = records_a.records().iter().map(|r| r.lineage_id).collect();
    let lineages_b: HashSet<_> = records_b.records().iter().map(|r| r.lineage_id).collect();
    assert!(lineages_a.is_disjoint(&lineages_b));
    assert_eq!(records_a.peer_reviews().len(), a.peer_reviews.len());
    assert_eq!(records_b.peer_reviews().len(), b.peer_reviews.len());
}
