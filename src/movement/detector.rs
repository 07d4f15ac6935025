use std::collections::VecDeque;

use serde::Serialize;

pub const DEFAULT_WINDOW_SIZE: usize = 3;

/// Sliding window over the last `capacity` movement flags, oldest first.
#[derive(Debug, Clone)]
pub struct MovementDetector {
    window: VecDeque<bool>,
    capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementDiagnostics {
    pub history: Vec<bool>,
    pub consecutive_count: usize,
}

impl MovementDetector {
    /// `capacity` is clamped to at least one entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Record one observation and report whether the window is full and all moving.
    /// Keeps firing on every call while that holds; spacing alerts is the limiter's job.
    pub fn observe(&mut self, is_moving: bool) -> bool {
        self.window.push_back(is_moving);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        self.is_triggered()
    }

    pub fn is_triggered(&self) -> bool {
        self.window.len() == self.capacity && self.window.iter().all(|moving| *moving)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Vec<bool> {
        self.window.iter().copied().collect()
    }

    /// Number of `true` entries in the window, not necessarily adjacent.
    pub fn moving_count(&self) -> usize {
        self.window.iter().filter(|moving| **moving).count()
    }

    pub fn diagnostics(&self) -> MovementDiagnostics {
        MovementDiagnostics {
            history: self.window(),
            consecutive_count: self.moving_count(),
        }
    }
}

impl Default for MovementDetector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
