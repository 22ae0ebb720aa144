//! Pure retry state machine: `transition(state, event) -> (state, effects)`.

use serde::{Deserialize, Serialize};

use crate::pipeline::{RunResult, TaskRequest};

const DECISION_CHARS: usize = 200;
const TEST_FAILURE_CHARS: usize = 300;
const HURDLE_CHARS: usize = 100;
const HURDLE_ITEMS: usize = 3;
const ERROR_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct IterationState {
    /// Number of the run in flight, or of the last run once finished. Zero before start.
    pub iteration: u32,
    pub max_iterations: u32,
    pub history: Vec<RunResult>,
    /// The request the next run receives; feedback accumulates here.
    pub request: TaskRequest,
    pub finished: bool,
}

impl IterationState {
    /// `max_iterations` is clamped to at least one.
    pub fn new(request: TaskRequest, max_iterations: u32) -> Self {
        Self {
            iteration: 0,
            max_iterations: max_iterations.max(1),
            history: Vec::new(),
            request,
            finished: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    Start,
    RunFinished(Box<RunResult>),
}

#[derive(Debug, Clone)]
pub enum Effect {
    ExecuteRun { iteration: u32, request: TaskRequest },
    Finished(IterationOutcome),
}

/// Every run performed, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationOutcome {
    pub iterations: u32,
    pub complete: bool,
    pub history: Vec<RunResult>,
}

impl IterationOutcome {
    pub fn last(&self) -> Option<&RunResult> {
        self.history.last()
    }
}

pub fn transition(mut state: IterationState, event: Event) -> (IterationState, Vec<Effect>) {
    if state.finished {
        return (state, Vec::new());
    }
    match event {
        Event::Start if state.iteration == 0 => {
            state.iteration = 1;
            let effect = Effect::ExecuteRun {
                iteration: 1,
                request: state.request.clone(),
            };
            (state, vec![effect])
        }
        Event::Start => (state, Vec::new()),
        Event::RunFinished(_) if state.iteration == 0 => (state, Vec::new()),
        Event::RunFinished(run) => {
            let complete = is_complete(&run);
            let digest = if complete { String::new() } else { feedback_digest(&run) };
            state.history.push(*run);

            if complete || state.iteration >= state.max_iterations {
                state.finished = true;
                let outcome = IterationOutcome {
                    iterations: state.iteration,
                    complete,
                    history: std::mem::take(&mut state.history),
                };
                return (state, vec![Effect::Finished(outcome)]);
            }

            if !digest.is_empty() {
                state.request = std::mem::replace(&mut state.request, TaskRequest::new(""))
                    .with_feedback(digest);
            }
            state.iteration += 1;
            let effect = Effect::ExecuteRun {
                iteration: state.iteration,
                request: state.request.clone(),
            };
            (state, vec![effect])
        }
    }
}

/// Merged, or built cleanly with nothing critical outstanding and nothing rejected.
pub fn is_complete(run: &RunResult) -> bool {
    run.merged()
        || (run.build_succeeded()
            && run.hurdles.unresolved_critical().is_empty()
            && !run.has_pending_rejection())
}

/// What the next run should know about this one. Empty when there is nothing to report.
pub fn feedback_digest(run: &RunResult) -> String {
    let mut lines = Vec::new();

    if let Some(integration) = &run.integration {
        if integration.has_unresolved_feedback {
            let posted = integration
                .reviews_posted
                .iter()
                .filter(|r| r.is_unresolved())
                .count();
            let count = integration.unresolved_feedback.len().max(posted);
            lines.push(format!(
                "- Integration request has {count} unresolved feedback items"
            ));
        }
        if integration.deferred {
            if let Some(text) = &integration.decision_text {
                lines.push(format!(
                    "- Integrator decision: {}",
                    clip(text, DECISION_CHARS)
                ));
            }
        }
    }

    if run.tests_passed == Some(false) {
        if let Some(results) = &run.test_results {
            lines.push(format!(
                "- Test failures: {}",
                clip(results, TEST_FAILURE_CHARS)
            ));
        }
    }

    let critical: Vec<String> = run
        .hurdles
        .unresolved_critical()
        .into_iter()
        .take(HURDLE_ITEMS)
        .map(|h| clip(&h.issue, HURDLE_CHARS))
        .collect();
    if !critical.is_empty() {
        lines.push(format!("- Critical hurdles: {}", critical.join(", ")));
    }

    if let Some(error) = &run.error {
        lines.push(format!(
            "- Run failed: {}: {}",
            error.kind,
            clip(&error.message, ERROR_CHARS)
        ));
    }

    lines.join("\n")
}

fn clip(text: &str, chars: usize) -> String {
    text.trim().chars().take(chars).collect()
}
