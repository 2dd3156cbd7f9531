//! Critical-section occupancy recorder.
//!
//! Workers call [`Timeline::enter`] after taking the lock and
//! [`Timeline::leave`] before giving it back. The timeline counts events by
//! kind and keeps the highest number of workers it ever saw inside at once.

use std::sync::Arc;

use parking_lot::Mutex;

/// What happened to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Entered the critical section.
    Entered,
    /// Left the critical section.
    Left,
    /// Stopped early because it was interrupted.
    Interrupted,
}

#[derive(Debug, Default)]
struct Occupancy {
    inside: usize,
    max_inside: usize,
    entered: usize,
    left: usize,
    interrupted: usize,
}

/// Shared, cheaply cloneable occupancy counters.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    occupancy: Arc<Mutex<Occupancy>>,
}

impl Timeline {
    /// Creates an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `worker` entering the critical section.
    pub fn enter(&self, worker: usize) {
        let mut occupancy = self.occupancy.lock();
        occupancy.inside += 1;
        occupancy.entered += 1;
        occupancy.max_inside = occupancy.max_inside.max(occupancy.inside);
        tracing::trace!(worker, inside = occupancy.inside, "entered");
    }

    /// Records `worker` leaving the critical section.
    pub fn leave(&self, worker: usize) {
        let mut occupancy = self.occupancy.lock();
        occupancy.inside = occupancy.inside.saturating_sub(1);
        occupancy.left += 1;
        tracing::trace!(worker, inside = occupancy.inside, "left");
    }

    /// Records that `worker` stopped because it was interrupted.
    pub fn interrupted(&self, worker: usize) {
        self.occupancy.lock().interrupted += 1;
        tracing::debug!(worker, "worker interrupted");
    }

    /// Highest number of workers inside at the same time.
    pub fn max_inside(&self) -> usize {
        self.occupancy.lock().max_inside
    }

    /// Number of recorded events of `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        let occupancy = self.occupancy.lock();
        match kind {
            EventKind::Entered => occupancy.entered,
            EventKind::Left => occupancy.left,
            EventKind::Interrupted => occupancy.interrupted,
        }
    }
}
