//! FIFO queue of waiter signals.

use std::collections::VecDeque;

use super::signal::{Signal, SignalId};

/// Waiters of a queued lock, oldest first.
///
/// Signals are unique within a queue and removed by identity.
#[derive(Debug, Clone, Default)]
pub(crate) struct WaitQueue {
    signals: VecDeque<Signal>,
}

impl WaitQueue {
    pub(crate) fn push_back(&mut self, signal: Signal) {
        debug_assert!(!self.contains(signal.id()), "signal queued twice");
        self.signals.push_back(signal);
    }

    pub(crate) fn pop_front(&mut self) -> Option<Signal> {
        self.signals.pop_front()
    }

    /// Removes the signal with `id`, keeping the order of the others.
    ///
    /// Returns `false` if it is not queued (for instance because it was
    /// already popped and resolved).
    pub(crate) fn remove(&mut self, id: SignalId) -> bool {
        self.signals
            .iter()
            .position(|signal| signal.id() == id)
            .and_then(|position| self.signals.remove(position))
            .is_some()
    }

    pub(crate) fn contains(&self, id: SignalId) -> bool {
        self.signals.iter().any(|signal| signal.id() == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.signals.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
