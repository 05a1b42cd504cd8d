//! DecisionSink implementations.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::DecisionRecord;

/// Durable per-turn audit log. The engine never calls this itself; the
/// driver of a session hands records over after each decided turn.
///
/// Also implemented for `Arc<S>` so a sink can be shared for assertions.
#[async_trait]
pub trait DecisionSink: Send + Sync {
    async fn persist(&self, record: &DecisionRecord) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryDecisionSink (tests and dry runs)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryDecisionSink {
    records: Mutex<Vec<DecisionRecord>>,
}

impl MemoryDecisionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything persisted so far, oldest first.
    pub fn records(&self) -> Vec<DecisionRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DecisionSink for MemoryDecisionSink {
    async fn persist(&self, record: &DecisionRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("decision sink lock poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Arc<S> blanket
// ---------------------------------------------------------------------------

#[async_trait]
impl<S: DecisionSink + ?Sized> DecisionSink for Arc<S> {
    async fn persist(&self, record: &DecisionRecord) -> Result<()> {
        (**self).persist(record).await
    }
}
