//! Structured lifecycle events for orchestration runs.
//!
//! Every function logs one `info!` (or `warn!`) line with a stable `event`
//! field, so log pipelines can filter on `event = "phase.finished"` and
//! similar. Use [`run_span`] to tag everything emitted during one run.

use tracing::{info, warn};

/// Span tagging every log line of one run. Attach it to the run future
/// with `tracing::Instrument`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("taskcrew.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, task_type: &str, phases: usize) {
    info!(event = "run.started", run_id = %run_id, task_type = %task_type, phases = phases);
}

pub fn emit_run_finished(run_id: &str, final_state: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        final_state = %final_state,
        duration_ms = duration_ms,
        success = success,
    );
}

pub fn emit_phase_started(phase: &str, role: &str) {
    info!(event = "phase.started", phase = %phase, role = %role);
}

pub fn emit_phase_finished(
    phase: &str,
    role: &str,
    succeeded: bool,
    hurdles: usize,
    duration_ms: u64,
) {
    info!(
        event = "phase.finished",
        phase = %phase,
        role = %role,
        succeeded = succeeded,
        hurdles = hurdles,
        duration_ms = duration_ms,
    );
}

/// Phase not required by the classification.
pub fn emit_phase_skipped(phase: &str) {
    info!(event = "phase.skipped", phase = %phase);
}

pub fn emit_gate_decided(checkpoint_id: &str, kind: &str, status: &str, auto_approved: bool) {
    info!(
        event = "gate.decided",
        checkpoint_id = %checkpoint_id,
        kind = %kind,
        status = %status,
        auto_approved = auto_approved,
    );
}

pub fn emit_hurdle_escalated(phase: &str, issue: &str, severity: &str) {
    warn!(event = "hurdle.escalated", phase = %phase, issue = %issue, severity = %severity);
}

/// Text exceeded its budget and was reduced.
pub fn emit_context_overflow(label: &str, total_tokens: usize, max_tokens: usize) {
    warn!(
        event = "context.overflow",
        label = %label,
        total_tokens = total_tokens,
        max_tokens = max_tokens,
    );
}

pub fn emit_role_fired(role: &str, lineage_id: &str, reason: &str) {
    warn!(event = "role.fired", role = %role, lineage_id = %lineage_id, reason = %reason);
}

pub fn emit_role_replaced(role: &str, old_lineage: &str, new_lineage: &str) {
    info!(
        event = "role.replaced",
        role = %role,
        old_lineage = %old_lineage,
        new_lineage = %new_lineage,
    );
}

pub fn emit_iteration_started(iteration: u32, max_iterations: u32) {
    info!(event = "iteration.started", iteration = iteration, max_iterations = max_iterations);
}

pub fn emit_iteration_finished(iteration: u32, complete: bool) {
    info!(event = "iteration.finished", iteration = iteration, complete = complete);
}

/// A collaborator failed in a way that does not abort the run.
pub fn emit_collaborator_error(collaborator: &str, error: &dyn std::fmt::Display) {
    warn!(event = "collaborator.error", collaborator = %collaborator, error = %error);
}
