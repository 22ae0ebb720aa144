//! SurrealDB-backed MetricsSink implementation
//!
//! Uses `schema` row types for persistence, converting to/from
//! `storage_traits` records at the boundary.

use async_trait::async_trait;
use serde::Serialize;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::migrations::{self, COUNTERS_TABLE};
use crate::schema::{AgentActionRow, PhaseTimingRow, QualityScoreRow, TokenUsageRow};
use crate::storage_traits::{
    AgentAction, Counter, MetricsSink, PhaseTiming, QualityScore, StorageResult, TokenUsage,
};

const NAMESPACE: &str = "taskcrew";
const DATABASE: &str = "metrics";

/// SurrealDB-backed implementation of [`MetricsSink`].
pub struct SurrealMetricsSink {
    db: Surreal<Any>,
}

impl SurrealMetricsSink {
    /// Create an in-memory instance.
    ///
    /// Connects to `mem://`, selects `taskcrew/metrics`, and runs `init_schema`.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect("mem://").await
    }

    /// Connect to any URL understood by `surrealdb::engine::any`
    /// (`mem://`, `surrealkv://path`, `ws://host:port`).
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!(url = %url, "SurrealMetricsSink connected");
        Ok(Self { db })
    }

    /// Re-run schema initialization on the open connection.
    pub async fn reinitialize(&self) -> StorageResult<()> {
        migrations::init_schema(&self.db).await
    }

    /// Number of rows currently stored in `table`.
    pub async fn row_count(&self, table: &str) -> StorageResult<u64> {
        let mut res = self
            .db
            .query("SELECT VALUE count() FROM type::table($tb) GROUP ALL")
            .bind(("tb", table.to_string()))
            .await?;
        let counts: Vec<u64> = res.take(0)?;
        Ok(counts.into_iter().next().unwrap_or(0))
    }

    async fn insert<R>(&self, table: &'static str, row: R) -> StorageResult<()>
    where
        R: Serialize + Send + 'static,
    {
        self.db
            .query("CREATE type::table($tb) CONTENT $row")
            .bind(("tb", table))
            .bind(("row", row))
            .await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl MetricsSink for SurrealMetricsSink {
    async fn record_action(&self, action: AgentAction) -> StorageResult<()> {
        debug!(role = %action.role, action = %action.action_type, "recording agent action");
        self.insert("agent_actions", AgentActionRow::from(action))
            .await
    }

    async fn record_phase(&self, timing: PhaseTiming) -> StorageResult<()> {
        debug!(phase = %timing.phase, "recording phase timing");
        self.insert("phase_timings", PhaseTimingRow::from(timing))
            .await
    }

    async fn record_tokens(&self, usage: TokenUsage) -> StorageResult<()> {
        self.insert("token_usage", TokenUsageRow::from(usage)).await
    }

    async fn record_quality(&self, score: QualityScore) -> StorageResult<()> {
        self.insert("quality_scores", QualityScoreRow::from(score))
            .await
    }

    async fn increment(&self, counter: Counter, by: u64) -> StorageResult<()> {
        self.db
            .query("UPDATE type::thing($tb, $name) SET value += $by")
            .bind(("tb", COUNTERS_TABLE))
            .bind(("name", counter.as_str()))
            .bind(("by", by))
            .await?
            .check()?;
        Ok(())
    }

    async fn counter(&self, counter: Counter) -> StorageResult<u64> {
        Ok(migrations::read_counter(&self.db, counter)
            .await?
            .unwrap_or(0))
    }

    async fn token_usage(&self, run_id: &str) -> StorageResult<Vec<TokenUsage>> {
        let mut res = self
            .db
            .query(
                "SELECT run_id, timestamp, role, phase, model, input_tokens, output_tokens, \
                 estimated_cost FROM token_usage WHERE run_id = $rid ORDER BY timestamp ASC",
            )
            .bind(("rid", run_id.to_string()))
            .await?;
        let rows: Vec<TokenUsageRow> = res.take(0)?;
        Ok(rows.into_iter().map(TokenUsage::from).collect())
    }
}
