//! Per-run registry of role records.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{LifecycleError, LifecycleResult};
use super::record::{
    should_be_fired, PeerReview, RoleInstance, RoleRecord, RoleStatus, DEFAULT_FIRE_THRESHOLD,
};
use super::review::{HeuristicScorer, ReviewScorer};
use crate::metrics::METRICS;
use crate::obs;
use crate::roles::Role;

/// Builds the successor instance from `(role, fired instance, firing reason)`.
pub type ReplacementFactory = Arc<dyn Fn(Role, &RoleInstance, &str) -> RoleInstance + Send + Sync>;

/// Factory that keeps the persona and tells the successor why its
/// predecessor was dismissed.
pub fn briefed_replacement() -> ReplacementFactory {
    Arc::new(|_role, previous, reason| RoleInstance {
        persona: format!(
            "{}\nYou replace a predecessor dismissed for: {reason}. Avoid repeating those mistakes.",
            previous.persona
        ),
        generation: previous.generation + 1,
    })
}

/// Observable lifecycle side effects, drained by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Registered {
        role: Role,
        lineage_id: Uuid,
    },
    PeerReviewed {
        reviewer: Role,
        reviewed: Role,
        rating: u8,
    },
    UnderReview {
        role: Role,
        average_rating: f64,
    },
    Reinstated {
        role: Role,
    },
    Fired {
        role: Role,
        lineage_id: Uuid,
        reason: String,
    },
    Replaced {
        role: Role,
        old_lineage: Uuid,
        new_lineage: Uuid,
    },
}

/// Outcome of [`LifecycleManager::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Retained,
    Fired { replacement: Option<Uuid> },
}

/// Outcome of [`LifecycleManager::fire`].
#[derive(Debug, Clone)]
pub struct FireOutcome {
    pub fired: Uuid,
    pub replacement: Option<RoleRecord>,
}

/// One line of [`LifecycleManager::performance_report`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub role: Role,
    pub lineage_id: Uuid,
    pub status: RoleStatus,
    pub generation: u32,
    pub average_rating: f64,
    pub reviews: usize,
    pub firing_reason: Option<String>,
}

/// Owns every [`RoleRecord`] of one run.
///
/// Records are append-only: firing changes a status, replacement pushes a
/// new record. At most one working record exists per role.
pub struct LifecycleManager {
    records: Vec<RoleRecord>,
    current: HashMap<Role, usize>,
    factories: HashMap<Role, ReplacementFactory>,
    scorer: Arc<dyn ReviewScorer>,
    threshold: f64,
    events: Vec<LifecycleEvent>,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("records", &self.records.len())
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            current: HashMap::new(),
            factories: HashMap::new(),
            scorer: Arc::new(HeuristicScorer),
            threshold: DEFAULT_FIRE_THRESHOLD,
            events: Vec::new(),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ReviewScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Register `factory` for `role`; fired roles without one stay fired.
    pub fn with_factory(mut self, role: Role, factory: ReplacementFactory) -> Self {
        self.factories.insert(role, factory);
        self
    }

    pub fn set_factory(&mut self, role: Role, factory: ReplacementFactory) {
        self.factories.insert(role, factory);
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Register `role`. Returns `false` (and changes nothing) when the role
    /// already has a record in this run.
    pub fn register(&mut self, role: Role, instance: RoleInstance) -> bool {
        if self.current.contains_key(&role) {
            return false;
        }
        let record = RoleRecord::new(role, instance);
        let lineage_id = record.lineage_id;
        self.push_current(record);
        self.events.push(LifecycleEvent::Registered { role, lineage_id });
        debug!(role = %role, lineage = %lineage_id, "role registered");
        true
    }

    pub fn is_registered(&self, role: Role) -> bool {
        self.current.contains_key(&role)
    }

    /// The latest record for `role`, whatever its status.
    pub fn record(&self, role: Role) -> Option<&RoleRecord> {
        self.current.get(&role).and_then(|&i| self.records.get(i))
    }

    /// The instance currently doing `role`'s work, if any.
    pub fn instance(&self, role: Role) -> Option<&RoleInstance> {
        self.record(role)
            .filter(|r| r.status.is_working())
            .map(|r| &r.instance)
    }

    /// Every record ever created, oldest first.
    pub fn records(&self) -> &[RoleRecord] {
        &self.records
    }

    /// Have `reviewer` rate `reviewed`'s `excerpt`.
    pub fn conduct_peer_review(
        &mut self,
        reviewer: Role,
        reviewed: Role,
        excerpt: &str,
        context: &str,
    ) -> LifecycleResult<PeerReview> {
        let assessment = self.scorer.assess(reviewer, reviewed, excerpt, context);
        self.add_review(reviewer, reviewed, assessment.rating, assessment.feedback)
    }

    /// Record an externally produced review.
    pub fn add_review(
        &mut self,
        reviewer: Role,
        reviewed: Role,
        rating: u8,
        feedback: impl Into<String>,
    ) -> LifecycleResult<PeerReview> {
        if !(1..=5).contains(&rating) {
            return Err(LifecycleError::InvalidRating { rating });
        }
        let record = self.working_mut(reviewed)?;
        let review = PeerReview {
            reviewer_role: reviewer,
            reviewed_role: reviewed,
            rating,
            feedback: feedback.into(),
            timestamp: Utc::now(),
        };
        record.push_review(review.clone());
        self.events.push(LifecycleEvent::PeerReviewed {
            reviewer,
            reviewed,
            rating,
        });
        Ok(review)
    }

    /// Put `role` under review and either reinstate or fire it.
    pub fn evaluate(&mut self, role: Role) -> LifecycleResult<Evaluation> {
        let threshold = self.threshold;
        let record = self.working_mut(role)?;
        transition(record, RoleStatus::UnderReview)?;
        let average_rating = record.average_rating();
        let fire = should_be_fired(record, threshold);
        self.events.push(LifecycleEvent::UnderReview {
            role,
            average_rating,
        });

        if fire {
            let reason = format!(
                "average peer rating {average_rating:.2} below {threshold:.2} or repeated poor reviews"
            );
            let outcome = self.fire(role, &reason)?;
            return Ok(Evaluation::Fired {
                replacement: outcome.replacement.map(|r| r.lineage_id),
            });
        }

        let record = self.working_mut(role)?;
        transition(record, RoleStatus::Active)?;
        self.events.push(LifecycleEvent::Reinstated { role });
        Ok(Evaluation::Retained)
    }

    /// Fire `role`, then replace it immediately when a factory is registered.
    pub fn fire(&mut self, role: Role, reason: &str) -> LifecycleResult<FireOutcome> {
        let record = self.working_mut(role)?;
        transition(record, RoleStatus::Fired)?;
        record.fired_at = Some(Utc::now());
        record.firing_reason = Some(reason.to_string());
        let fired = record.lineage_id;

        METRICS.inc_roles_fired();
        obs::emit_role_fired(&role.to_string(), &fired.to_string(), reason);
        self.events.push(LifecycleEvent::Fired {
            role,
            lineage_id: fired,
            reason: reason.to_string(),
        });

        let replacement = if self.factories.contains_key(&role) {
            Some(self.replace(role, reason)?)
        } else {
            None
        };
        Ok(FireOutcome { fired, replacement })
    }

    /// Replace a fired role with a fresh record carrying `reason` forward.
    pub fn replace(&mut self, role: Role, reason: &str) -> LifecycleResult<RoleRecord> {
        let factory = self
            .factories
            .get(&role)
            .cloned()
            .ok_or_else(|| LifecycleError::NoReplacementFactory {
                role: role.to_string(),
            })?;
        let index = *self
            .current
            .get(&role)
            .ok_or_else(|| LifecycleError::NotRegistered {
                role: role.to_string(),
            })?;
        let old = self
            .records
            .get_mut(index)
            .ok_or_else(|| LifecycleError::NotRegistered {
                role: role.to_string(),
            })?;
        transition(old, RoleStatus::Replaced)?;
        let old_lineage = old.lineage_id;
        let instance = factory(role, &old.instance, reason);

        let mut successor = RoleRecord::new(role, instance);
        successor.predecessor = Some(old_lineage);
        successor.replacement_context = Some(reason.to_string());
        let new_lineage = successor.lineage_id;
        self.push_current(successor.clone());

        obs::emit_role_replaced(
            &role.to_string(),
            &old_lineage.to_string(),
            &new_lineage.to_string(),
        );
        self.events.push(LifecycleEvent::Replaced {
            role,
            old_lineage,
            new_lineage,
        });
        info!(role = %role, "role replaced");
        Ok(successor)
    }

    /// Take all events emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<LifecycleEvent> {
        std::mem::take(&mut self.events)
    }

    /// All peer reviews across records, oldest record first.
    pub fn peer_reviews(&self) -> Vec<PeerReview> {
        self.records
            .iter()
            .flat_map(|r| r.peer_reviews.iter().cloned())
            .collect()
    }

    pub fn performance_report(&self) -> Vec<PerformanceSummary> {
        self.records
            .iter()
            .map(|r| PerformanceSummary {
                role: r.role_name,
                lineage_id: r.lineage_id,
                status: r.status,
                generation: r.instance.generation,
                average_rating: r.average_rating(),
                reviews: r.peer_reviews.len(),
                firing_reason: r.firing_reason.clone(),
            })
            .collect()
    }

    fn push_current(&mut self, record: RoleRecord) {
        let role = record.role_name;
        self.records.push(record);
        self.current.insert(role, self.records.len() - 1);
    }

    fn working_mut(&mut self, role: Role) -> LifecycleResult<&mut RoleRecord> {
        let not_registered = || LifecycleError::NotRegistered {
            role: role.to_string(),
        };
        let index = *self.current.get(&role).ok_or_else(not_registered)?;
        let record = self.records.get_mut(index).ok_or_else(not_registered)?;
        if !record.status.is_working() {
            return Err(LifecycleError::InvalidTransition {
                role: role.to_string(),
                from: record.status.to_string(),
                to: "working".to_string(),
            });
        }
        Ok(record)
    }
}

fn transition(record: &mut RoleRecord, next: RoleStatus) -> LifecycleResult<()> {
    if !record.status.can_transition_to(next) {
        return Err(LifecycleError::InvalidTransition {
            role: record.role_name.to_string(),
            from: record.status.to_string(),
            to: next.to_string(),
        });
    }
    record.status = next;
    Ok(())
}
