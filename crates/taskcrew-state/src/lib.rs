//! Taskcrew-State: metrics persistence for taskcrew runs
//!
//! This crate owns the append-only metrics log written while a request moves
//! through its phases: agent actions, phase timings, token usage, quality
//! scores and a small set of named counters.
//!
//! ## Key Components
//!
//! - [`MetricsSink`]: the narrow async interface the orchestrator writes to
//! - [`SurrealMetricsSink`]: SurrealDB-backed store (in-memory or remote)
//! - [`fakes`]: `MemoryMetricsSink` and `NoopMetricsSink` for tests and
//!   unattended runs

mod error;
pub mod fakes;
pub mod migrations;
pub mod pricing;
mod schema;
pub mod storage_traits;
pub mod surreal_sink;

pub use error::StorageError;
pub use pricing::estimate_cost;
pub use storage_traits::{
    AgentAction, Counter, MetricsSink, PhaseTiming, QualityScore, StorageResult, TokenTotals,
    TokenUsage,
};
pub use surreal_sink::SurrealMetricsSink;
