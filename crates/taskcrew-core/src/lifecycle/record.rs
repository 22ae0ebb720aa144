//! Role records, peer reviews and performance entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roles::Role;

/// Average rating assumed when a role has no peer reviews yet.
pub const NEUTRAL_RATING: f64 = 3.0;

/// Average below which a role is fired.
pub const DEFAULT_FIRE_THRESHOLD: f64 = 2.0;

/// How many recent performance entries the streak rule looks at.
const RECENT_WINDOW: usize = 3;

/// Poor entries within the window that trigger firing.
const POOR_IN_WINDOW: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleStatus {
    Active,
    UnderReview,
    Fired,
    Replaced,
}

impl RoleStatus {
    /// Allowed moves: `Active -> UnderReview -> {Fired, Active}` and
    /// `Active -> Fired -> Replaced`.
    pub fn can_transition_to(self, next: RoleStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::UnderReview)
                | (Self::Active, Self::Fired)
                | (Self::UnderReview, Self::Active)
                | (Self::UnderReview, Self::Fired)
                | (Self::Fired, Self::Replaced)
        )
    }

    /// Whether the role still does work.
    pub fn is_working(self) -> bool {
        matches!(self, Self::Active | Self::UnderReview)
    }
}

impl std::fmt::Display for RoleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::UnderReview => "under_review",
            Self::Fired => "fired",
            Self::Replaced => "replaced",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceLevel {
    Excellent,
    Good,
    Satisfactory,
    Poor,
    Unacceptable,
}

impl PerformanceLevel {
    /// Map a 1..=5 rating onto a level.
    pub fn from_rating(rating: u8) -> Self {
        match rating {
            5.. => Self::Excellent,
            4 => Self::Good,
            3 => Self::Satisfactory,
            2 => Self::Poor,
            _ => Self::Unacceptable,
        }
    }

    pub fn is_poor(self) -> bool {
        matches!(self, Self::Poor | Self::Unacceptable)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub level: PerformanceLevel,
    pub rating: u8,
    pub note: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerReview {
    pub reviewer_role: Role,
    pub reviewed_role: Role,
    /// 1..=5
    pub rating: u8,
    pub feedback: String,
    pub timestamp: DateTime<Utc>,
}

/// What the execution capability is told to act as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInstance {
    pub persona: String,
    /// 0 for the original instance, +1 per replacement.
    pub generation: u32,
}

impl RoleInstance {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            generation: 0,
        }
    }

    pub fn default_for(role: Role) -> Self {
        Self::new(role.default_persona())
    }
}

/// One incarnation of a role. Never edited after it is fired, apart from
/// the final `Fired -> Replaced` status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub role_name: Role,
    pub lineage_id: Uuid,
    pub status: RoleStatus,
    pub instance: RoleInstance,
    pub performance_history: Vec<PerformanceEntry>,
    pub peer_reviews: Vec<PeerReview>,
    pub created_at: DateTime<Utc>,
    pub fired_at: Option<DateTime<Utc>>,
    pub firing_reason: Option<String>,
    /// Lineage of the fired record this one replaces.
    pub predecessor: Option<Uuid>,
    /// Firing reason of the predecessor, carried forward.
    pub replacement_context: Option<String>,
}

impl RoleRecord {
    pub fn new(role_name: Role, instance: RoleInstance) -> Self {
        Self {
            role_name,
            lineage_id: Uuid::new_v4(),
            status: RoleStatus::Active,
            peer_reviews: Vec::new(),
            performance_history: Vec::new(),
            instance,
            created_at: Utc::now(),
            fired_at: None,
            firing_reason: None,
            predecessor: None,
            replacement_context: None,
        }
    }

    /// Mean peer rating, or the neutral 3.0 when there are none.
    pub fn average_rating(&self) -> f64 {
        if self.peer_reviews.is_empty() {
            return NEUTRAL_RATING;
        }
        let sum: u32 = self.peer_reviews.iter().map(|r| u32::from(r.rating)).sum();
        f64::from(sum) / self.peer_reviews.len() as f64
    }

    /// Append a review and the performance entry derived from it.
    pub(crate) fn push_review(&mut self, review: PeerReview) {
        self.performance_history.push(PerformanceEntry {
            level: PerformanceLevel::from_rating(review.rating),
            rating: review.rating,
            note: review.feedback.clone(),
            timestamp: review.timestamp,
        });
        self.peer_reviews.push(review);
    }

    /// Count of POOR/UNACCEPTABLE entries among the most recent ones.
    fn recent_poor(&self) -> usize {
        self.performance_history
            .iter()
            .rev()
            .take(RECENT_WINDOW)
            .filter(|e| e.level.is_poor())
            .count()
    }
}

/// Whether `record` should be fired.
///
/// True iff the average peer rating is below `threshold`, or at least two of
/// the last three performance entries are POOR/UNACCEPTABLE.
pub fn should_be_fired(record: &RoleRecord, threshold: f64) -> bool {
    record.average_rating() < threshold || record.recent_poor() >= POOR_IN_WINDOW
}
