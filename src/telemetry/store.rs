use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::{TelemetryReport, TelemetrySnapshot};

/// Holds the single most recent snapshot. Readers get a cheap `Arc` clone.
pub struct LatestStateStore {
    current: RwLock<Arc<TelemetrySnapshot>>,
}

impl LatestStateStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(TelemetrySnapshot::empty(Utc::now()))),
        }
    }

    pub fn update(&self, report: TelemetryReport, received_at: DateTime<Utc>) -> Arc<TelemetrySnapshot> {
        let snapshot = Arc::new(TelemetrySnapshot::from_report(report, received_at));
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::clone(&snapshot);
        snapshot
    }

    pub fn current(&self) -> Arc<TelemetrySnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}

impl Default for LatestStateStore {
    fn default() -> Self {
        Self::new()
    }
}
