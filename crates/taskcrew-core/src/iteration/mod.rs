//! Bounded retry loop around the pipeline.
//!
//! [`transition`] holds the retry and feedback logic with no side effects;
//! [`IterationController`] executes the effects it asks for.

mod machine;

use std::collections::VecDeque;

use taskcrew_state::Counter;
use tracing::{info, warn};

use crate::metrics::METRICS;
use crate::obs;
use crate::pipeline::{OrchestrationContext, Orchestrator, TaskRequest};

pub use machine::{
    feedback_digest, is_complete, transition, Effect, Event, IterationOutcome, IterationState,
};

pub struct IterationController {
    orchestrator: Orchestrator,
}

impl IterationController {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run `request` until complete or `max_iterations` runs have happened.
    pub async fn run(&self, request: &str, max_iterations: u32) -> IterationOutcome {
        let ctx = self.orchestrator.new_context();
        self.run_with_context(&ctx, request, max_iterations).await
    }

    /// As [`run`](Self::run), sharing the role registry held by `ctx`.
    pub async fn run_with_context(
        &self,
        ctx: &OrchestrationContext,
        request: &str,
        max_iterations: u32,
    ) -> IterationOutcome {
        let state = IterationState::new(TaskRequest::new(request), max_iterations);
        let max_iterations = state.max_iterations;
        let (mut state, effects) = transition(state, Event::Start);
        let mut pending: VecDeque<Effect> = effects.into();

        while let Some(effect) = pending.pop_front() {
            match effect {
                Effect::ExecuteRun { iteration, request } => {
                    METRICS.inc_iterations();
                    obs::emit_iteration_started(iteration, max_iterations);
                    if let Err(e) = self
                        .orchestrator
                        .collaborators()
                        .metrics
                        .increment(Counter::TotalIterations, 1)
                        .await
                    {
                        obs::emit_collaborator_error("metrics", &e);
                    }

                    let run = self.orchestrator.run(ctx, &request, iteration).await;
                    obs::emit_iteration_finished(iteration, is_complete(&run));
                    let (next, effects) = transition(state, Event::RunFinished(Box::new(run)));
                    state = next;
                    pending.extend(effects);
                }
                Effect::Finished(outcome) => {
                    info!(
                        iterations = outcome.iterations,
                        complete = outcome.complete,
                        "iteration loop finished"
                    );
                    METRICS.flush();
                    return outcome;
                }
            }
        }

        warn!("iteration loop ended without a final outcome");
        METRICS.flush();
        IterationOutcome {
            iterations: state.iteration,
            complete: false,
            history: state.history,
        }
    }
}
