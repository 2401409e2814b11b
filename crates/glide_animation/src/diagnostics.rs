//! Diagnostics for failures recorded under the `Log` policy

use glide_core::{AnimationState, PropertyKey};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One recorded failure
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    /// Property whose animation failed
    pub property: PropertyKey,
    /// What was being done
    pub message: &'static str,
    /// The error text
    pub detail: String,
    /// Animation state after the failure
    pub state: AnimationState,
}

/// Bounded ring buffer of [`Diagnostic`]s
///
/// Oldest entries are dropped once the buffer is full.
#[derive(Debug)]
pub struct Diagnostics {
    capacity: usize,
    entries: Mutex<VecDeque<Diagnostic>>,
    dropped: AtomicUsize,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            dropped: AtomicUsize::new(0),
        }
    }

    pub fn record(&self, diagnostic: Diagnostic) {
        tracing::warn!(
            property = %diagnostic.property,
            state = %diagnostic.state,
            detail = %diagnostic.detail,
            "{}",
            diagnostic.message
        );

        let mut entries = self.entries.lock();
        entries.push_back(diagnostic);
        while entries.len() > self.capacity {
            entries.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copy of the retained entries, oldest first
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn last(&self) -> Option<Diagnostic> {
        self.entries.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entries evicted to stay within capacity
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(n: usize) -> Diagnostic {
        Diagnostic {
            property: PropertyKey::new::<()>(n, "value"),
            message: "transition failed",
            detail: format!("error {}", n),
            state: AnimationState::Halted,
        }
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let diags = Diagnostics::new(2);
        diags.record(diag(1));
        diags.record(diag(2));
        diags.record(diag(3));

        let entries = diags.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].detail, "error 2");
        assert_eq!(diags.last().unwrap().detail, "error 3");
        assert_eq!(diags.dropped(), 1);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let diags = Diagnostics::new(0);
        diags.record(diag(1));
        assert!(diags.is_empty());
        assert_eq!(diags.dropped(), 1);
    }

    #[test]
    fn test_clear() {
        let diags = Diagnostics::default();
        diags.record(diag(1));
        assert_eq!(diags.len(), 1);
        diags.clear();
        assert!(diags.is_empty());
    }
}
