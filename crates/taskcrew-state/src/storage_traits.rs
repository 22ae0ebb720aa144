//! Storage trait and record types for the metrics log.
//!
//! Records are plain values; the orchestrator builds them and hands them to
//! a [`MetricsSink`]. Phases and roles are carried as strings so this crate
//! stays independent of the core vocabulary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage trait operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// One unit of work performed by a role (an executor call, a posted comment, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub action_type: String,
    pub detail: String,
    pub duration_ms: u64,
}

impl AgentAction {
    pub fn new(
        run_id: impl Into<String>,
        role: impl Into<String>,
        action_type: impl Into<String>,
        detail: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            timestamp: Utc::now(),
            role: role.into(),
            action_type: action_type.into(),
            detail: detail.into(),
            duration_ms,
        }
    }
}

/// Wall-clock timing of one pipeline phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub run_id: String,
    pub phase: String,
    pub roles: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub succeeded: bool,
}

/// Token consumption of one executor call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub phase: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Estimated cost in USD, see [`crate::pricing::estimate_cost`].
    pub estimated_cost: f64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Aggregate over a set of [`TokenUsage`] rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost: f64,
}

impl TokenTotals {
    pub fn from_usages(usages: &[TokenUsage]) -> Self {
        usages.iter().fold(Self::default(), |mut acc, u| {
            acc.calls += 1;
            acc.input_tokens += u.input_tokens;
            acc.output_tokens += u.output_tokens;
            acc.estimated_cost += u.estimated_cost;
            acc
        })
    }
}

/// Code-quality figures extracted from a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub dry_violations: Option<u32>,
    pub complexity: Option<f64>,
    pub readability: Option<f64>,
    pub maintainability: Option<f64>,
}

impl QualityScore {
    /// True when the review carried no recognisable figure at all.
    pub fn is_empty(&self) -> bool {
        self.dry_violations.is_none()
            && self.complexity.is_none()
            && self.readability.is_none()
            && self.maintainability.is_none()
    }
}

/// Named project-level counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    RequestsStarted,
    RequestsCompleted,
    RequestsFailed,
    TotalIterations,
}

impl Counter {
    /// Every counter; all of them are seeded at zero on first init.
    pub const ALL: [Counter; 4] = [
        Counter::RequestsStarted,
        Counter::RequestsCompleted,
        Counter::RequestsFailed,
        Counter::TotalIterations,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Counter::RequestsStarted => "requests_started",
            Counter::RequestsCompleted => "requests_completed",
            Counter::RequestsFailed => "requests_failed",
            Counter::TotalIterations => "total_iterations",
        }
    }
}

impl std::fmt::Display for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only metrics log.
///
/// Writes never update or delete earlier rows, except counters which are
/// incremented in place. Implementations must be safe to share between
/// concurrent runs.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Record a single role action.
    async fn record_action(&self, action: AgentAction) -> StorageResult<()>;

    /// Record the timing of a finished phase.
    async fn record_phase(&self, timing: PhaseTiming) -> StorageResult<()>;

    /// Record token usage of one executor call.
    async fn record_tokens(&self, usage: TokenUsage) -> StorageResult<()>;

    /// Record quality figures parsed from a review.
    async fn record_quality(&self, score: QualityScore) -> StorageResult<()>;

    /// Add `by` to a named counter.
    async fn increment(&self, counter: Counter, by: u64) -> StorageResult<()>;

    /// Current value of a counter (zero if never written).
    async fn counter(&self, counter: Counter) -> StorageResult<u64>;

    /// All token usage rows for a run, oldest first.
    async fn token_usage(&self, run_id: &str) -> StorageResult<Vec<TokenUsage>>;
}
