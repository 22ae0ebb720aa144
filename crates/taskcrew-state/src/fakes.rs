//! In-memory fakes for the metrics sink (testing and unattended runs)
//!
//! Provides `MemoryMetricsSink`, which keeps every row in a `Vec`, and
//! `NoopMetricsSink`, which accepts and discards everything.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryMetricsSink
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    actions: Vec<AgentAction>,
    phases: Vec<PhaseTiming>,
    tokens: Vec<TokenUsage>,
    quality: Vec<QualityScore>,
    counters: HashMap<Counter, u64>,
}

/// In-memory metrics sink backed by plain vectors behind a `Mutex`.
#[derive(Debug, Default)]
pub struct MemoryMetricsSink {
    tables: Mutex<Tables>,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<AgentAction> {
        self.tables.lock().unwrap().actions.clone()
    }

    pub fn phases(&self) -> Vec<PhaseTiming> {
        self.tables.lock().unwrap().phases.clone()
    }

    pub fn quality_scores(&self) -> Vec<QualityScore> {
        self.tables.lock().unwrap().quality.clone()
    }

    pub fn all_token_usage(&self) -> Vec<TokenUsage> {
        self.tables.lock().unwrap().tokens.clone()
    }
}

#[async_trait]
impl MetricsSink for MemoryMetricsSink {
    async fn record_action(&self, action: AgentAction) -> StorageResult<()> {
        self.tables.lock().unwrap().actions.push(action);
        Ok(())
    }

    async fn record_phase(&self, timing: PhaseTiming) -> StorageResult<()> {
        self.tables.lock().unwrap().phases.push(timing);
        Ok(())
    }

    async fn record_tokens(&self, usage: TokenUsage) -> StorageResult<()> {
        self.tables.lock().unwrap().tokens.push(usage);
        Ok(())
    }

    async fn record_quality(&self, score: QualityScore) -> StorageResult<()> {
        self.tables.lock().unwrap().quality.push(score);
        Ok(())
    }

    async fn increment(&self, counter: Counter, by: u64) -> StorageResult<()> {
        *self
            .tables
            .lock()
            .unwrap()
            .counters
            .entry(counter)
            .or_insert(0) += by;
        Ok(())
    }

    async fn counter(&self, counter: Counter) -> StorageResult<u64> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .counters
            .get(&counter)
            .copied()
            .unwrap_or(0))
    }

    async fn token_usage(&self, run_id: &str) -> StorageResult<Vec<TokenUsage>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .tokens
            .iter()
            .filter(|u| u.run_id == run_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// NoopMetricsSink
// ---------------------------------------------------------------------------

/// Sink that accepts every write and remembers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

#[async_trait]
impl MetricsSink for NoopMetricsSink {
    async fn record_action(&self, _action: AgentAction) -> StorageResult<()> {
        Ok(())
    }

    async fn record_phase(&self, _timing: PhaseTiming) -> StorageResult<()> {
        Ok(())
    }

    async fn record_tokens(&self, _usage: TokenUsage) -> StorageResult<()> {
        Ok(())
    }

    async fn record_quality(&self, _score: QualityScore) -> StorageResult<()> {
        Ok(())
    }

    async fn increment(&self, _counter: Counter, _by: u64) -> StorageResult<()> {
        Ok(())
    }

    async fn counter(&self, _counter: Counter) -> StorageResult<u64> {
        Ok(0)
    }

    async fn token_usage(&self, _run_id: &str) -> StorageResult<Vec<TokenUsage>> {
        Ok(Vec::new())
    }
}
