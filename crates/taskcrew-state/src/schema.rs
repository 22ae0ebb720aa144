//! SurrealDB row types
//!
//! Rows mirror the `storage_traits` records but store timestamps as native
//! SurrealDB datetimes. Conversion happens at the sink boundary.

mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{AgentAction, PhaseTiming, QualityScore, TokenUsage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentActionRow {
    pub run_id: String,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub action_type: String,
    pub detail: String,
    pub duration_ms: u64,
}

impl From<AgentAction> for AgentActionRow {
    fn from(a: AgentAction) -> Self {
        Self {
            run_id: a.run_id,
            timestamp: a.timestamp,
            role: a.role,
            action_type: a.action_type,
            detail: a.detail,
            duration_ms: a.duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTimingRow {
    pub run_id: String,
    pub phase: String,
    pub roles: Vec<String>,
    #[serde(with = "surreal_datetime")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub succeeded: bool,
}

impl From<PhaseTiming> for PhaseTimingRow {
    fn from(p: PhaseTiming) -> Self {
        Self {
            run_id: p.run_id,
            phase: p.phase,
            roles: p.roles,
            started_at: p.started_at,
            finished_at: p.finished_at,
            duration_ms: p.duration_ms,
            succeeded: p.succeeded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsageRow {
    pub run_id: String,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub phase: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost: f64,
}

impl From<TokenUsage> for TokenUsageRow {
    fn from(u: TokenUsage) -> Self {
        Self {
            run_id: u.run_id,
            timestamp: u.timestamp,
            role: u.role,
            phase: u.phase,
            model: u.model,
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
            estimated_cost: u.estimated_cost,
        }
    }
}

impl From<TokenUsageRow> for TokenUsage {
    fn from(r: TokenUsageRow) -> Self {
        Self {
            run_id: r.run_id,
            timestamp: r.timestamp,
            role: r.role,
            phase: r.phase,
            model: r.model,
            input_tokens: r.input_tokens,
            output_tokens: r.output_tokens,
            estimated_cost: r.estimated_cost,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScoreRow {
    pub run_id: String,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub dry_violations: Option<u32>,
    pub complexity: Option<f64>,
    pub readability: Option<f64>,
    pub maintainability: Option<f64>,
}

impl From<QualityScore> for QualityScoreRow {
    fn from(q: QualityScore) -> Self {
        Self {
            run_id: q.run_id,
            timestamp: q.timestamp,
            role: q.role,
            dry_violations: q.dry_violations,
            complexity: q.complexity,
            readability: q.readability,
            maintainability: q.maintainability,
        }
    }
}
