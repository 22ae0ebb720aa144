//! Role lifecycle: peer reviews, performance tracking, firing and replacement.

mod error;
mod manager;
mod record;
mod review;

pub use error::{LifecycleError, LifecycleResult};
pub use manager::{
    briefed_replacement, Evaluation, FireOutcome, LifecycleEvent, LifecycleManager,
    PerformanceSummary, ReplacementFactory,
};
pub use record::{
    should_be_fired, PeerReview, PerformanceEntry, PerformanceLevel, RoleInstance, RoleRecord,
    RoleStatus, DEFAULT_FIRE_THRESHOLD, NEUTRAL_RATING,
};
pub use review::{HeuristicScorer, ReviewAssessment, ReviewScorer};
