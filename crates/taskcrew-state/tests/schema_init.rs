//! Integration tests for SurrealDB metrics schema initialization
//!
//! Re-initializing an existing store must keep counter values and must not
//! duplicate seed rows.

use taskcrew_state::{Counter, MetricsSink, SurrealMetricsSink};

#[tokio::test]
async fn test_counters_seeded_once() {
    let sink = SurrealMetricsSink::in_memory().await.unwrap();
    assert_eq!(sink.row_count("counters").await.unwrap(), Counter::ALL.len() as u64);

    sink.reinitialize().await.unwrap();
    sink.reinitialize().await.unwrap();

    assert_eq!(sink.row_count("counters").await.unwrap(), Counter::ALL.len() as u64);
}

#[tokio::test]
async fn test_reinitialize_preserves_counter_values() {
    let sink = SurrealMetricsSink::in_memory().await.unwrap();
    sink.increment(Counter::RequestsCompleted, 4).await.unwrap();

    sink.reinitialize().await.unwrap();

    assert_eq!(sink.counter(Counter::RequestsCompleted).await.unwrap(), 4);
}

#[tokio::test]
async fn test_empty_tables_count_zero() {
    let sink = SurrealMetricsSink::in_memory().await.unwrap();
    assert_eq!(sink.row_count("agent_actions").await.unwrap(), 0);
}
