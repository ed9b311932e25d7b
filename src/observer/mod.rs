//! Observation of audit progress
//!
//! The auditor reports verdicts and skipped instances as structured events.
//! Rendering is left to the observer; the audit result never depends on it.

use crate::config::SensitiveHit;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Verdict for one audited instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictEvent {
    pub instance_index: usize,
    pub total_instances: usize,
    pub is_fair: bool,
    pub offense: Option<SensitiveHit>,
    /// Name of the offending feature, if any
    pub offending_name: Option<String>,
    /// Feature indices in ranked order
    pub ranking: Vec<usize>,
}

/// Instance excluded from the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipEvent {
    pub instance_index: usize,
    pub total_instances: usize,
    pub reason: String,
}

/// Receives audit events in instance order
pub trait AuditObserver: Send + Sync {
    fn on_verdict(&self, event: &VerdictEvent);

    fn on_skip(&self, _event: &SkipEvent) {}

    /// Called once after the last instance
    fn on_complete(&self, _violations: usize, _total_instances: usize) {}
}

/// Logs events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AuditObserver for TracingObserver {
    fn on_verdict(&self, event: &VerdictEvent) {
        match (&event.offense, &event.offending_name) {
            (Some(hit), name) => info!(
                instance = event.instance_index,
                total = event.total_instances,
                feature = hit.feature_index,
                feature_name = name.as_deref().unwrap_or("?"),
                rank = hit.rank,
                ranking = ?event.ranking,
                "Unfair"
            ),
            (None, _) => info!(
                instance = event.instance_index,
                total = event.total_instances,
                ranking = ?event.ranking,
                "Fair"
            ),
        }
    }

    fn on_skip(&self, event: &SkipEvent) {
        warn!(
            instance = event.instance_index,
            total = event.total_instances,
            reason = %event.reason,
            "Instance skipped"
        );
    }

    fn on_complete(&self, violations: usize, total_instances: usize) {
        info!(violations, total_instances, "Number of unfair instances");
    }
}

/// Discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl AuditObserver for NullObserver {
    fn on_verdict(&self, _event: &VerdictEvent) {}
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingObserver {
    verdicts: Mutex<Vec<VerdictEvent>>,
    skips: Mutex<Vec<SkipEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verdicts(&self) -> Vec<VerdictEvent> {
        self.verdicts.lock().clone()
    }

    pub fn skips(&self) -> Vec<SkipEvent> {
        self.skips.lock().clone()
    }
}

impl AuditObserver for CollectingObserver {
    fn on_verdict(&self, event: &VerdictEvent) {
        self.verdicts.lock().push(event.clone());
    }

    fn on_skip(&self, event: &SkipEvent) {
        self.skips.lock().push(event.clone());
    }
}
