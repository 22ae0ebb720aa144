//! SurrealDB schema migrations and initialization
//!
//! Defines every metrics table and seeds the project counters. Safe to call
//! on every connection: table definitions are idempotent and counters are
//! only created when absent, so re-initializing never duplicates seed rows.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::{Counter, StorageResult};

/// Table holding counter rows.
pub const COUNTERS_TABLE: &str = "counters";

/// Initialize all taskcrew metrics tables.
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing taskcrew metrics schema");

    init_append_only_tables(db).await?;
    seed_counters(db).await?;

    info!("taskcrew metrics schema initialization complete");
    Ok(())
}

/// Define the append-only event tables.
///
/// ```text
/// TABLE agent_actions  { run_id, timestamp, role, action_type, detail, duration_ms }
/// TABLE phase_timings  { run_id, phase, roles, started_at, finished_at, duration_ms, succeeded }
/// TABLE token_usage    { run_id, timestamp, role, phase, model, input_tokens, output_tokens, estimated_cost }
/// TABLE quality_scores { run_id, timestamp, role, dry_violations?, complexity?, readability?, maintainability? }
/// ```
///
/// Rows are never updated or deleted by the application.
async fn init_append_only_tables(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing append-only metrics tables");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agent_actions SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_actions_run ON TABLE agent_actions COLUMNS run_id;

        DEFINE TABLE IF NOT EXISTS phase_timings SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_phases_run ON TABLE phase_timings COLUMNS run_id;

        DEFINE TABLE IF NOT EXISTS token_usage SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_tokens_run ON TABLE token_usage COLUMNS run_id;

        DEFINE TABLE IF NOT EXISTS quality_scores SCHEMALESS;

        DEFINE TABLE IF NOT EXISTS counters SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_counter_name ON TABLE counters COLUMNS name UNIQUE;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;

    Ok(())
}

/// Create each counter at zero unless it already exists.
async fn seed_counters(db: &Surreal<Any>) -> StorageResult<()> {
    for counter in Counter::ALL {
        if read_counter(db, counter).await?.is_some() {
            debug!(counter = %counter, "counter already seeded");
            continue;
        }

        db.query("CREATE type::thing($tb, $name) SET name = $name, value = 0")
            .bind(("tb", COUNTERS_TABLE))
            .bind(("name", counter.as_str()))
            .await
            .map_err(|e| StorageError::SchemaSetup(e.to_string()))?
            .check()
            .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
        debug!(counter = %counter, "counter seeded");
    }
    Ok(())
}

/// Read a counter value, `None` if the row does not exist.
pub(crate) async fn read_counter(
    db: &Surreal<Any>,
    counter: Counter,
) -> StorageResult<Option<u64>> {
    let mut res = db
        .query("SELECT VALUE value FROM type::thing($tb, $name)")
        .bind(("tb", COUNTERS_TABLE))
        .bind(("name", counter.as_str()))
        .await?;
    let values: Vec<u64> = res.take(0)?;
    Ok(values.into_iter().next())
}
