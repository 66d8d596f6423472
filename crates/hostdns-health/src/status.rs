//! Latest aggregated health verdict, shared between the aggregator and
//! the status server.
//!
//! The store holds one immutable `AggregatedSnapshot` behind an `Arc`.
//! Publishing swaps the pointer under the write lock, so a reader holds
//! either the old snapshot or the new one, never a mix.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

/// Overall verdict plus per-link-group verdicts from one aggregation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregatedSnapshot {
    /// `true` iff the workload reports `running` and every executable passed.
    pub overall: bool,
    /// Base address → group verdict.
    pub groups: BTreeMap<String, bool>,
}

/// Read side of the status store, as seen by the health server.
pub trait HealthStatus: Send + Sync + 'static {
    fn status(&self) -> Arc<AggregatedSnapshot>;
}

/// Concurrency-safe holder of the current snapshot.
#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    current: Arc<RwLock<Arc<AggregatedSnapshot>>>,
}

impl StatusStore {
    /// Create a store holding an unhealthy snapshot with no groups.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot.
    pub fn update(&self, snapshot: AggregatedSnapshot) -> Arc<AggregatedSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::clone(&snapshot);
        snapshot
    }

    /// The latest snapshot. Never blocks on a running cycle.
    pub fn read(&self) -> Arc<AggregatedSnapshot> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*current)
    }
}

impl HealthStatus for StatusStore {
    fn status(&self) -> Arc<AggregatedSnapshot> {
        self.read()
    }
}
